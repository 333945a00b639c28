//! Preparing the application environment: compile-time defines in the
//! environment file and the cloud gem packages the app imports.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::context::SiteContext;
use crate::core::defines::{Define, apply_define};
use crate::io::files::{ensure_exists, read_content, write_file};
use crate::io::link::{LinkOutcome, PackageLinker, link_gem_packages};
use crate::io::workspace::{cloud_gem_folders, gem_packages};

/// Options shared by every define invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefineOptions {
    /// Whitelist the engine's cloud gem folders for metrics.
    pub whitelist_gems: bool,
}

/// Link the cloud gem packages into the portal's `node_modules`.
pub fn link_packages<L: PackageLinker>(
    ctx: &SiteContext,
    linker: &L,
) -> Result<Vec<LinkOutcome>> {
    let packages = gem_packages(&ctx.gems_dir)
        .with_context(|| format!("find gem packages in {}", ctx.gems_dir.display()))?;
    let outcomes = link_gem_packages(linker, &packages, &ctx.root, &ctx.installed_packages_dir());
    let failed = outcomes
        .iter()
        .filter(|outcome| !outcome.global_linked || outcome.local_linked == Some(false))
        .count();
    if failed > 0 {
        warn!(failed, linked = outcomes.len() - failed, "some gem packages were not linked");
    } else {
        info!(linked = outcomes.len(), "linked gem packages");
    }
    Ok(outcomes)
}

/// Ensure the environment file exists, then apply the global defines and `define`.
pub fn set_define(ctx: &SiteContext, define: Define, options: DefineOptions) -> Result<()> {
    let path = ctx.environment_file();
    ensure_exists(&path)?;

    let gems = if options.whitelist_gems {
        let names = cloud_gem_folders(&ctx.gems_dir)
            .with_context(|| format!("list cloud gems in {}", ctx.gems_dir.display()))?;
        info!(gems = ?names, "whitelisting cloud gems for metrics");
        names
    } else {
        Vec::new()
    };

    let content = read_content(&path)?;
    let updated = apply_define(&content, define, &gems);
    if updated != content {
        write_file(&path, &updated)?;
    }
    info!(%define, file = %path.display(), "applied define");
    Ok(())
}

/// Apply `define`, logging instead of failing. Used on cleanup paths.
pub fn set_define_best_effort(ctx: &SiteContext, define: Define) {
    if let Err(err) = set_define(ctx, define, DefineOptions::default()) {
        warn!(%define, err = %format!("{err:#}"), "failed to apply define");
    }
}
