//! Distribution build: loader config and page transform, bundling steps and
//! deployment of the results into the www directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::context::SiteContext;
use crate::core::defines::Define;
use crate::core::loader_config::{DistributionArtifacts, to_distribution};
use crate::environment::{DefineOptions, link_packages, set_define, set_define_best_effort};
use crate::io::files::{read_required, write_file};
use crate::io::link::PackageLinker;
use crate::io::toolchain::run_steps;
use crate::io::workspace::{clean, copy_dist_assets};

/// What a distribution build produced.
#[derive(Debug, Clone)]
pub struct DistReport {
    pub config_script: PathBuf,
    pub page: PathBuf,
    pub deployed: Vec<PathBuf>,
}

/// Write the distribution loader config and page next to their dev sources.
///
/// The dev page and dev config are read only; they are never rewritten here.
pub fn write_distribution_files(ctx: &SiteContext) -> Result<DistributionArtifacts> {
    let config_path = ctx.loader_config_path();
    let page_path = ctx.page_path();
    let config_source = read_required(&config_path)?;
    let page_source = read_required(&page_path)?;

    let artifacts = to_distribution(&config_source, &page_source)
        .with_context(|| format!("transform {}", config_path.display()))?;
    write_file(&ctx.dist_loader_config_path(), &artifacts.config_script)?;
    write_file(&ctx.dist_page_path(), &artifacts.page)?;
    info!(
        config = %ctx.dist_loader_config_path().display(),
        page = %ctx.dist_page_path().display(),
        "wrote distribution loader config and page"
    );
    Ok(artifacts)
}

/// Full distribution build. The dev define is restored even when a step fails.
#[instrument(skip_all, fields(root = %ctx.root.display()))]
pub fn build_distribution<L: PackageLinker>(
    ctx: &SiteContext,
    linker: &L,
    options: DefineOptions,
) -> Result<DistReport> {
    let result = build_steps(ctx, linker, options);
    set_define_best_effort(ctx, Define::Prod(false));
    result
}

fn build_steps<L: PackageLinker>(
    ctx: &SiteContext,
    linker: &L,
    options: DefineOptions,
) -> Result<DistReport> {
    clean(&ctx.dist_clean_plan()).context("clean distribution outputs")?;
    set_define(ctx, Define::Test(false), options)?;
    set_define(ctx, Define::Prod(true), options)?;
    write_distribution_files(ctx)?;
    link_packages(ctx, linker)?;
    run_steps("dist", &ctx.config.build.dist_steps, &ctx.root, ctx.step_timeout())?;
    let deployed = copy_dist_assets(&ctx.root, &ctx.dist_page_path(), &ctx.www_dir())?;
    Ok(DistReport {
        config_script: ctx.dist_loader_config_path(),
        page: ctx.dist_page_path(),
        deployed,
    })
}
