//! Multi-region e2e runs.
//!
//! Regions are provisioned on scoped threads with staggered starts. Each
//! thread hands its own explicit working directory to the CLI, and the shared
//! settings record sits behind a mutex. Every region gets its own page file
//! (`<region>_index.html`), so the canonical page is only read.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::context::SiteContext;
use crate::core::settings::{ProjectSettingsRecord, RegionSettings};
use crate::core::stack::{ProvisionFailure, project_stack_name};
use crate::io::automation::BrowserAutomation;
use crate::io::cloud_cli::{BootstrapLookup, CloudCli, LmbrAws, StackCreation};
use crate::io::files::FileSnapshot;
use crate::io::server::DevServer;
use crate::io::settings_store::SettingsStore;
use crate::orchestrate::{report_failure, write_bootstrap};
use crate::testrun::{AdminLogin, Suite, SuiteRun, TestOutcome, TestRunner};

/// Per-region result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionReport {
    pub region: String,
    /// True when a project stack was created during this run.
    pub created_stack: bool,
    pub failure: Option<ProvisionFailure>,
    pub outcome: Option<TestOutcome>,
}

impl RegionReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.outcome.as_ref().is_some_and(|o| o.passed)
    }
}

/// File name of the page written for `region`.
pub fn region_page_name(region: &str, page_name: &str) -> String {
    format!("{region}_{page_name}")
}

/// Provision, bootstrap and test each region, then restore page and settings.
#[instrument(skip_all, fields(regions = ?regions))]
pub fn run_regions<C, S, A>(
    ctx: &SiteContext,
    cli: &C,
    server: &S,
    automation: &A,
    regions: &[String],
) -> Result<Vec<RegionReport>>
where
    C: CloudCli + Sync,
    S: DevServer,
    A: BrowserAutomation,
{
    let aws = LmbrAws::new(cli);
    let settings_path = resolve_settings_path(ctx, aws.settings_path()?);
    info!(settings = %settings_path.display(), "local project settings");

    let page_snapshot = FileSnapshot::capture(&ctx.page_path())?;
    let mut store = SettingsStore::open(&settings_path)?;

    let result = provision_and_test(ctx, cli, server, automation, regions, &mut store);

    let page_restored = page_snapshot.restore();
    let settings_restored = store.restore();
    let reports = result?;
    page_restored.context("restore page")?;
    settings_restored.context("restore local project settings")?;
    Ok(reports)
}

fn resolve_settings_path(ctx: &SiteContext, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        ctx.engine_root.join(path)
    }
}

fn provision_and_test<C, S, A>(
    ctx: &SiteContext,
    cli: &C,
    server: &S,
    automation: &A,
    regions: &[String],
    store: &mut SettingsStore,
) -> Result<Vec<RegionReport>>
where
    C: CloudCli + Sync,
    S: DevServer,
    A: BrowserAutomation,
{
    let settings = Mutex::new(store.record.clone());
    let stagger = Duration::from_secs(ctx.config.provision.stagger_secs);

    let mut reports: Vec<RegionReport> = thread::scope(|scope| {
        let handles: Vec<_> = regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                let settings = &settings;
                scope.spawn(move || provision_region(ctx, cli, settings, region, index, stagger))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("region provisioning thread panicked"))?
            })
            .collect::<Result<Vec<_>>>()
    })?;

    store.record = settings
        .into_inner()
        .map_err(|_| anyhow!("settings lock poisoned"))?;
    store.save()?;
    let settings_json = store.record.to_pretty_json()?;
    info!(settings = %settings_json, "project stack out parameters");

    if reports.iter().all(|report| report.failure.is_some()) {
        return Ok(reports);
    }

    let handle = server.start().context("start dev server")?;
    let runner = TestRunner::new(ctx, automation, handle.base_url());
    for report in reports.iter_mut().filter(|report| report.failure.is_none()) {
        let region_settings = store.record.region(&report.region).unwrap_or_default();
        let admin = match (region_settings.username, region_settings.password) {
            (Some(username), Some(password)) => Some(AdminLogin { username, password }),
            _ => None,
        };
        let page = region_settings
            .url
            .unwrap_or_else(|| region_page_name(&report.region, &ctx.page_name()));
        let run = SuiteRun::new(Suite::AuthenticationWelcomePage, admin)?.on_page(page);
        report.outcome = Some(runner.run(&run)?);
    }
    handle.stop()?;
    Ok(reports)
}

fn provision_region<C: CloudCli>(
    ctx: &SiteContext,
    cli: &C,
    settings: &Mutex<ProjectSettingsRecord>,
    region: &str,
    index: usize,
    stagger: Duration,
) -> Result<RegionReport> {
    let aws = LmbrAws::new(cli);
    let mut report = RegionReport {
        region: region.to_string(),
        created_stack: false,
        failure: None,
        outcome: None,
    };

    let (provisioned, existing) = {
        let guard = settings.lock().map_err(|_| anyhow!("settings lock poisoned"))?;
        (guard.is_provisioned(region), guard.region(region))
    };
    info!(region, settings = ?existing, "Region to test");

    let mut region_settings = if provisioned {
        existing.unwrap_or_default()
    } else {
        // Stack creation in the framework is not safe to start simultaneously.
        let delay = stagger * u32::try_from(index).unwrap_or(u32::MAX);
        if !delay.is_zero() {
            info!(region, delay_secs = delay.as_secs(), "staggering stack creation");
            thread::sleep(delay);
        }
        let offset = i64::try_from(index).unwrap_or_default();
        let stack_name = project_stack_name(Utc::now().timestamp_millis() + offset);
        match aws.create_project_stack(&stack_name, region)? {
            StackCreation::Created { credentials } => {
                report.created_stack = true;
                let mut fresh = RegionSettings::default();
                if let Some(creds) = credentials {
                    fresh.username = Some(creds.username);
                    fresh.password = Some(creds.password);
                }
                fresh
            }
            StackCreation::Failed(failure) => {
                report_failure(&failure, &ctx.engine_root);
                report.failure = Some(failure);
                return Ok(report);
            }
        }
    };

    let page_name = region_page_name(region, &ctx.page_name());
    let output = ctx.root.join(&page_name);
    info!(region, page = %page_name, "Saving the page for region");
    match write_bootstrap(&aws, &ctx.page_path(), &output, Some(region))? {
        BootstrapLookup::Found(_) => {}
        BootstrapLookup::NotFound(failure) => {
            report_failure(&failure, &ctx.engine_root);
            report.failure = Some(failure);
        }
    }
    region_settings.url = Some(page_name);

    settings
        .lock()
        .map_err(|_| anyhow!("settings lock poisoned"))?
        .set_region(region, &region_settings)?;
    if report.failure.is_some() {
        warn!(region, "region skipped: no bootstrap");
    }
    Ok(report)
}

/// Default region list when none is given.
pub fn default_regions(ctx: &SiteContext) -> Vec<String> {
    vec![ctx.config.cli.default_region.clone()]
}

/// Path of a region page under the portal root.
pub fn region_page_path(ctx: &SiteContext, region: &str) -> PathBuf {
    ctx.root.join(region_page_name(region, &ctx.page_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::PortalConfig;
    use crate::test_support::{
        BOOTSTRAP_OUTPUT, DEV_PAGE, RecordingServer, ScriptedAutomation, ScriptedCli, TestSite,
    };

    const SETTINGS: &str = r#"{
  "us-east-1": {
    "ProjectStackId": "arn:aws:cloudformation:us-east-1:123:stack/CGPProjStk1/x"
  }
}"#;

    fn site() -> TestSite {
        let mut config = PortalConfig::default();
        config.provision.stagger_secs = 0;
        TestSite::with_config(config).expect("site")
    }

    fn settings_path(site: &TestSite) -> PathBuf {
        site.ctx.engine_root.join("local-project-settings.json")
    }

    #[test]
    fn provisions_missing_regions_and_restores_everything() {
        let site = site();
        std::fs::write(settings_path(&site), SETTINGS).expect("settings");
        let cli = ScriptedCli::new()
            .respond(
                "cloud-gem-framework paths",
                "Local Project Settings   local-project-settings.json\n",
            )
            .respond(
                "project create",
                "Stack 'CGPProjStk9' update complete\nUsername: admin2\nPassword: Pw2!\n",
            )
            .respond("cloud-gem-framework cloud-gem-portal", BOOTSTRAP_OUTPUT);
        let server = RecordingServer::default();
        let automation = ScriptedAutomation::default();
        let regions = vec!["us-east-1".to_string(), "us-west-2".to_string()];

        let reports = run_regions(&site.ctx, &cli, &server, &automation, &regions).expect("run");

        assert_eq!(reports.len(), 2);
        assert!(!reports[0].created_stack);
        assert!(reports[1].created_stack);
        assert!(reports.iter().all(RegionReport::passed));
        assert_eq!(server.starts(), 1);

        let creates: Vec<_> = cli
            .calls()
            .into_iter()
            .filter(|call| call.first().map(String::as_str) == Some("project"))
            .collect();
        assert_eq!(creates.len(), 1);
        assert!(creates[0].contains(&"us-west-2".to_string()));

        let seen = automation.seen();
        assert_eq!(seen.len(), 2);
        let west = seen
            .iter()
            .find(|(request, _)| request.args.iter().any(|a| a.ends_with("us-west-2_index.html")))
            .expect("west run");
        assert!(west.0.args.contains(&"admin2".to_string()));

        assert_eq!(site.read("index.html"), DEV_PAGE);
        assert_eq!(
            std::fs::read_to_string(settings_path(&site)).expect("settings"),
            SETTINGS
        );
        assert!(site.ctx.engine_root.join("local-project-settings.json_bak").is_file());
        assert!(region_page_path(&site.ctx, "us-west-2").is_file());
    }

    #[test]
    fn failed_creation_skips_region_tests() {
        let site = site();
        std::fs::write(settings_path(&site), "{}").expect("settings");
        let cli = ScriptedCli::new()
            .respond(
                "cloud-gem-framework paths",
                "Local Project Settings   local-project-settings.json\n",
            )
            .respond("project create", "Quota exceeded");
        let server = RecordingServer::default();
        let automation = ScriptedAutomation::default();

        let reports = run_regions(
            &site.ctx,
            &cli,
            &server,
            &automation,
            &["eu-west-1".to_string()],
        )
        .expect("run");
        assert!(reports[0].failure.is_some());
        assert!(!reports[0].passed());
        assert_eq!(server.starts(), 0);
        assert!(automation.seen().is_empty());
        assert_eq!(
            std::fs::read_to_string(settings_path(&site)).expect("settings"),
            "{}"
        );
    }
}
