//! Cloud Gem Portal build, bootstrap and e2e tooling.
//!
//! Every command resolves a [`SiteContext`] for the portal root once, then
//! hands explicit directories to the external tools it drives.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use portal::context::SiteContext;
use portal::core::defines::Define;
use portal::core::stack::{AdminCredentials, ProvisionFailure};
use portal::dist::build_distribution;
use portal::environment::{DefineOptions, link_packages, set_define};
use portal::exit_codes;
use portal::io::toolchain::run_steps;
use portal::io::workspace::clean;
use portal::logging;
use portal::orchestrate::{BootstrapPlan, ServeOutcome, bootstrap_and_serve};
use portal::regions::{default_regions, run_regions};
use portal::testrun::{ALL_SUITES, Suite, SuiteRun, TestRunner, resolve_admin};

#[derive(Parser)]
#[command(
    name = "portal",
    version,
    about = "Build, bootstrap and test the Cloud Gem Portal"
)]
struct Cli {
    /// Portal root directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Configuration file (default: `<root>/portal.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite the compile-time defines in the environment file.
    Define(DefineArgs),
    /// Build, bootstrap and start the local dev server.
    Serve {
        /// Skip the preparation build steps.
        #[arg(long)]
        no_build: bool,
        /// Whitelist the engine's cloud gems for metrics.
        #[arg(long)]
        whitelist_gems: bool,
    },
    /// Produce the distribution page, loader config and bundles.
    Dist {
        /// Whitelist the engine's cloud gems for metrics.
        #[arg(long)]
        whitelist_gems: bool,
    },
    /// Delete build outputs.
    Clean,
    /// Run an e2e suite (or all of them) against the local dev server.
    Test {
        suite: SuiteSelection,
        /// Administrator user name.
        #[arg(long)]
        user: Option<String>,
        /// Administrator password.
        #[arg(long)]
        password: Option<String>,
        /// Skip the preparation build steps.
        #[arg(long)]
        no_build: bool,
    },
    /// Provision and test the welcome page in one or more regions.
    TestRegions {
        /// Region to test; repeatable.
        #[arg(long = "region")]
        regions: Vec<String>,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("mode").required(true).args(["prod", "dev", "test_on", "test_off"])))]
struct DefineArgs {
    #[arg(long)]
    prod: bool,
    #[arg(long)]
    dev: bool,
    #[arg(long)]
    test_on: bool,
    #[arg(long)]
    test_off: bool,
    /// Whitelist the engine's cloud gems for metrics.
    #[arg(long)]
    whitelist_gems: bool,
}

impl DefineArgs {
    fn define(&self) -> Define {
        if self.prod {
            Define::Prod(true)
        } else if self.dev {
            Define::Prod(false)
        } else {
            Define::Test(self.test_on)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SuiteSelection {
    MessageOfTheDay,
    AuthenticationNoBootstrap,
    AuthenticationWelcomePage,
    DynamicContent,
    UserAdministrator,
    All,
}

impl SuiteSelection {
    fn suites(self) -> Vec<Suite> {
        match self {
            SuiteSelection::MessageOfTheDay => vec![Suite::MessageOfTheDay],
            SuiteSelection::AuthenticationNoBootstrap => vec![Suite::AuthenticationNoBootstrap],
            SuiteSelection::AuthenticationWelcomePage => vec![Suite::AuthenticationWelcomePage],
            SuiteSelection::DynamicContent => vec![Suite::DynamicContent],
            SuiteSelection::UserAdministrator => vec![Suite::UserAdministrator],
            SuiteSelection::All => ALL_SUITES.to_vec(),
        }
    }
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(exit_byte(code)),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_byte(exit_codes::INVALID))
        }
    }
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            err.print().context("print usage")?;
            return Ok(code);
        }
    };
    let ctx = SiteContext::load(&cli.root, cli.config.as_deref())?;
    match cli.command {
        Command::Define(args) => cmd_define(&ctx, &args),
        Command::Serve {
            no_build,
            whitelist_gems,
        } => cmd_serve(&ctx, no_build, DefineOptions { whitelist_gems }),
        Command::Dist { whitelist_gems } => cmd_dist(&ctx, DefineOptions { whitelist_gems }),
        Command::Clean => cmd_clean(&ctx),
        Command::Test {
            suite,
            user,
            password,
            no_build,
        } => cmd_test(&ctx, suite, user.as_deref(), password.as_deref(), no_build),
        Command::TestRegions { regions } => cmd_test_regions(&ctx, regions),
    }
}

fn cmd_define(ctx: &SiteContext, args: &DefineArgs) -> Result<i32> {
    let options = DefineOptions {
        whitelist_gems: args.whitelist_gems,
    };
    set_define(ctx, args.define(), options)?;
    Ok(exit_codes::OK)
}

/// Test define off, gem package links, preparation steps, dev define: the state
/// every local run starts from.
fn prepare(ctx: &SiteContext, no_build: bool, options: DefineOptions) -> Result<()> {
    set_define(ctx, Define::Test(false), options)?;
    if no_build {
        info!("skipping package links and preparation steps");
    } else {
        link_packages(ctx, &ctx.package_linker())?;
        run_steps("prepare", &ctx.config.build.prepare_steps, &ctx.root, ctx.step_timeout())?;
    }
    set_define(ctx, Define::Prod(false), options)
}

fn serve_plan(ctx: &SiteContext) -> BootstrapPlan {
    BootstrapPlan::for_page(
        ctx.page_path(),
        &ctx.config.cli.default_region,
        &ctx.engine_root,
    )
}

fn cmd_serve(ctx: &SiteContext, no_build: bool, options: DefineOptions) -> Result<i32> {
    prepare(ctx, no_build, options)?;
    let cli = ctx.cloud_cli();
    match bootstrap_and_serve(&cli, serve_plan(ctx), &ctx.dev_server())? {
        ServeOutcome::Serving {
            server,
            credentials,
        } => {
            print_credentials(credentials.as_ref());
            info!(url = %server.page_url(&ctx.page_name()), "portal is being served");
            let status = server.wait()?;
            info!(?status, "dev server exited");
            Ok(exit_codes::OK)
        }
        ServeOutcome::Aborted(failure) => Ok(provision_failed(&failure)),
    }
}

fn cmd_dist(ctx: &SiteContext, options: DefineOptions) -> Result<i32> {
    let report = build_distribution(ctx, &ctx.package_linker(), options)?;
    info!(
        page = %report.page.display(),
        config = %report.config_script.display(),
        deployed = report.deployed.len(),
        "distribution build complete"
    );
    Ok(exit_codes::OK)
}

fn cmd_clean(ctx: &SiteContext) -> Result<i32> {
    for path in clean(&ctx.clean_plan())? {
        println!("{}", path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_test(
    ctx: &SiteContext,
    selection: SuiteSelection,
    user: Option<&str>,
    password: Option<&str>,
    no_build: bool,
) -> Result<i32> {
    // Credentials are checked for every suite before anything is touched.
    let runs = selection
        .suites()
        .into_iter()
        .map(|suite| SuiteRun::new(suite, resolve_admin(suite, user, password)?))
        .collect::<Result<Vec<_>>>()?;

    prepare(ctx, no_build, DefineOptions::default())?;
    let cli = ctx.cloud_cli();
    let server = match bootstrap_and_serve(&cli, serve_plan(ctx), &ctx.dev_server())? {
        ServeOutcome::Serving { server, .. } => server,
        ServeOutcome::Aborted(failure) => return Ok(provision_failed(&failure)),
    };

    let automation = ctx.automation();
    let runner = TestRunner::new(ctx, &automation, server.base_url());
    let outcomes = runner.run_all(&runs);
    server.stop().context("stop dev server")?;

    let outcomes = outcomes?;
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|outcome| !outcome.passed)
        .map(|outcome| outcome.suite.to_string())
        .collect();
    if failed.is_empty() {
        info!(suites = outcomes.len(), "all suites passed");
        Ok(exit_codes::OK)
    } else {
        error!(failed = ?failed, "e2e suites failed");
        Ok(exit_codes::TESTS_FAILED)
    }
}

fn cmd_test_regions(ctx: &SiteContext, regions: Vec<String>) -> Result<i32> {
    let regions = if regions.is_empty() {
        default_regions(ctx)
    } else {
        regions
    };
    let cli = ctx.cloud_cli();
    let reports = run_regions(ctx, &cli, &ctx.dev_server(), &ctx.automation(), &regions)?;

    let mut code = exit_codes::OK;
    for report in &reports {
        if report.failure.is_some() {
            warn!(region = %report.region, "region could not be provisioned");
            code = exit_codes::PROVISION_FAILED;
        } else if !report.passed() {
            warn!(region = %report.region, "region tests failed");
            if code == exit_codes::OK {
                code = exit_codes::TESTS_FAILED;
            }
        } else {
            info!(region = %report.region, created_stack = report.created_stack, "region passed");
        }
    }
    Ok(code)
}

fn print_credentials(credentials: Option<&AdminCredentials>) {
    let Some(credentials) = credentials else {
        return;
    };
    match serde_json::to_string_pretty(credentials) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(%err, "failed to serialize administrator credentials"),
    }
}

fn provision_failed(failure: &ProvisionFailure) -> i32 {
    error!(stage = ?failure.stage, "{}", failure.summary);
    exit_codes::PROVISION_FAILED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_define_mode() {
        let cli = Cli::parse_from(["portal", "define", "--test-on"]);
        let Command::Define(args) = cli.command else {
            panic!("expected define");
        };
        assert_eq!(args.define(), Define::Test(true));
    }

    #[test]
    fn define_requires_exactly_one_mode() {
        assert!(Cli::try_parse_from(["portal", "define"]).is_err());
        assert!(Cli::try_parse_from(["portal", "define", "--prod", "--dev"]).is_err());
    }

    #[test]
    fn parse_test_all_with_credentials() {
        let cli = Cli::parse_from([
            "portal",
            "--root",
            "/tmp/portal",
            "test",
            "all",
            "--password",
            "secret",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/portal"));
        let Command::Test {
            suite, password, ..
        } = cli.command
        else {
            panic!("expected test");
        };
        assert_eq!(suite.suites(), ALL_SUITES.to_vec());
        assert_eq!(password.as_deref(), Some("secret"));
    }

    #[test]
    fn parse_repeated_regions() {
        let cli = Cli::parse_from([
            "portal",
            "test-regions",
            "--region",
            "us-east-1",
            "--region",
            "eu-west-1",
        ]);
        let Command::TestRegions { regions } = cli.command else {
            panic!("expected test-regions");
        };
        assert_eq!(regions, ["us-east-1", "eu-west-1"]);
    }
}
