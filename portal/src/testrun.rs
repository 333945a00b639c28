//! End-to-end suite runs against the local dev server.
//!
//! A run mutates the page under test (bootstrap overrides) and the environment
//! file (test define). Both are put back after the automation finishes, whether
//! it passed, failed or could not be run at all.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::ValueEnum;
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::context::SiteContext;
use crate::core::bootstrap::capture_bootstrap;
use crate::core::defines::Define;
use crate::environment::{DefineOptions, set_define, set_define_best_effort};
use crate::io::automation::{AutomationRequest, BrowserAutomation};
use crate::io::files::{FileSnapshot, read_content, replace_if_match_file};

/// Administrator user assumed when none is given.
pub const DEFAULT_ADMIN_USER: &str = "administrator";

const TEST_USER_PREFIX: &str = "zzztestUser1";
const TEST_EMAIL_PREFIX: &str = "cgp-integ-test";
const TEST_USER_PASSWORD: &str = "Test01)!";
const TEST_USER_NEW_PASSWORD: &str = "Test02)@";

/// Named e2e suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Suite {
    MessageOfTheDay,
    AuthenticationNoBootstrap,
    AuthenticationWelcomePage,
    DynamicContent,
    UserAdministrator,
}

/// Order used by `all`. The page-mutating authentication suites go first.
pub const ALL_SUITES: [Suite; 5] = [
    Suite::AuthenticationNoBootstrap,
    Suite::AuthenticationWelcomePage,
    Suite::DynamicContent,
    Suite::MessageOfTheDay,
    Suite::UserAdministrator,
];

/// One pattern/value rewrite applied to the page before a run.
#[derive(Debug, Clone)]
pub struct BootstrapOverride {
    pub pattern: Regex,
    pub value: String,
}

impl BootstrapOverride {
    fn new(pattern: &str, value: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            value: value.to_string(),
        })
    }
}

impl Suite {
    pub fn spec(self) -> &'static str {
        match self {
            Suite::MessageOfTheDay => "./e2e/message-of-the-day.e2e-spec.js",
            Suite::AuthenticationNoBootstrap => {
                "./e2e/sequential/authentication-no-bootstrap.e2e-spec.js"
            }
            Suite::AuthenticationWelcomePage => {
                "./e2e/sequential/authentication-welcome-page.e2e-spec.js"
            }
            Suite::DynamicContent => "./e2e/dynamic-content.e2e-spec.js",
            Suite::UserAdministrator => "./e2e/user-administration.e2e-spec.js",
        }
    }

    /// Whether the suite logs in as the administrator.
    pub fn needs_admin(self) -> bool {
        !matches!(
            self,
            Suite::AuthenticationNoBootstrap | Suite::AuthenticationWelcomePage
        )
    }

    pub fn overrides(self) -> Result<Vec<BootstrapOverride>> {
        let single = match self {
            Suite::AuthenticationNoBootstrap => {
                BootstrapOverride::new(r"var bootstrap = \{.*\}", "var bootstrap = {}")?
            }
            Suite::AuthenticationWelcomePage => {
                BootstrapOverride::new(r#""firstTimeUse": false"#, r#""firstTimeUse": true"#)?
            }
            Suite::MessageOfTheDay | Suite::DynamicContent | Suite::UserAdministrator => {
                BootstrapOverride::new(r#""firstTimeUse": true"#, r#""firstTimeUse": false"#)?
            }
        };
        Ok(vec![single])
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Administrator login handed to the automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminLogin {
    pub username: String,
    pub password: String,
}

/// Resolve the administrator login for `suite` from optional user input.
///
/// Suites that do not log in get `None`. For the others a missing user name
/// falls back to [`DEFAULT_ADMIN_USER`] and a missing password is an error.
pub fn resolve_admin(
    suite: Suite,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<Option<AdminLogin>> {
    if !suite.needs_admin() {
        return Ok(None);
    }
    let username = match username {
        Some(name) => name.to_string(),
        None => {
            warn!("No user argument provided. Defaulting to {DEFAULT_ADMIN_USER}");
            DEFAULT_ADMIN_USER.to_string()
        }
    };
    let Some(password) = password else {
        bail!("suite {suite}: argument --password must be provided");
    };
    Ok(Some(AdminLogin {
        username,
        password: password.to_string(),
    }))
}

/// One suite run request.
#[derive(Debug, Clone)]
pub struct SuiteRun {
    pub suite: Suite,
    pub overrides: Vec<BootstrapOverride>,
    pub admin: Option<AdminLogin>,
    /// Page to mutate and point the browser at, relative to the portal root.
    /// Defaults to the configured page.
    pub page: Option<String>,
}

impl SuiteRun {
    pub fn new(suite: Suite, admin: Option<AdminLogin>) -> Result<Self> {
        Ok(Self {
            suite,
            overrides: suite.overrides()?,
            admin,
            page: None,
        })
    }

    pub fn on_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }
}

/// Result of one suite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub suite: Suite,
    pub passed: bool,
    pub exit_code: Option<i32>,
}

/// Random five-letter suffix for generated test identities.
pub fn make_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| char::from(rng.sample(Alphanumeric)))
        .filter(char::is_ascii_alphabetic)
        .take(5)
        .collect()
}

/// Runs suites through a browser automation against a served page.
pub struct TestRunner<'a, A: BrowserAutomation> {
    ctx: &'a SiteContext,
    automation: &'a A,
    base_url: String,
}

impl<'a, A: BrowserAutomation> TestRunner<'a, A> {
    pub fn new(ctx: &'a SiteContext, automation: &'a A, base_url: impl Into<String>) -> Self {
        Self {
            ctx,
            automation,
            base_url: base_url.into(),
        }
    }

    fn page_path(&self, run: &SuiteRun) -> (PathBuf, String) {
        match &run.page {
            Some(page) => (self.ctx.root.join(page), page.clone()),
            None => (self.ctx.page_path(), self.ctx.page_name()),
        }
    }

    /// Snapshot, mutate, run, then restore the page and the test define.
    ///
    /// An automation error is returned only after restoration. When both fail,
    /// the automation error is returned and the restore error is logged.
    #[instrument(skip_all, fields(suite = %run.suite))]
    pub fn run(&self, run: &SuiteRun) -> Result<TestOutcome> {
        let (page_path, page_name) = self.page_path(run);
        let snapshot = FileSnapshot::capture(&page_path)?;

        let result = self.mutate_and_run(run, &page_path, &page_name);

        let restored = snapshot.restore();
        set_define_best_effort(self.ctx, Define::Test(false));
        let outcome = match (result, restored) {
            (Ok(outcome), restored) => {
                restored?;
                outcome
            }
            (Err(err), Err(restore_err)) => {
                error!(
                    page = %page_path.display(),
                    err = %format!("{restore_err:#}"),
                    "failed to restore page after automation error"
                );
                return Err(err);
            }
            (Err(err), Ok(())) => return Err(err),
        };

        info!(suite = %run.suite, passed = outcome.passed, "The test '{}' is done", run.suite.spec());
        Ok(outcome)
    }

    fn mutate_and_run(&self, run: &SuiteRun, page_path: &Path, page_name: &str) -> Result<TestOutcome> {
        set_define(self.ctx, Define::Test(true), DefineOptions::default())?;
        for rule in &run.overrides {
            info!(pattern = %rule.pattern, value = %rule.value, "applying bootstrap override");
            replace_if_match_file(page_path, &rule.pattern, &rule.value, None)?;
        }

        let request = AutomationRequest {
            spec: run.suite.spec().to_string(),
            args: self.automation_args(run, page_name),
        };
        let bootstrap = capture_bootstrap(&read_content(page_path)?).map(|record| record.raw);
        info!(
            spec = %request.spec,
            args = ?request.args,
            cwd = %self.ctx.root.display(),
            bootstrap = ?bootstrap,
            "Running test"
        );

        let report = self.automation.run(&request)?;
        if !report.passed {
            warn!(exit_code = ?report.exit_code, "suite failed");
        }
        Ok(TestOutcome {
            suite: run.suite,
            passed: report.passed,
            exit_code: report.exit_code,
        })
    }

    /// Protractor `--params` for one run. The admin login is passed only when
    /// `run.admin` is set, which [`resolve_admin`] does for suites that sign in.
    fn automation_args(&self, run: &SuiteRun, page_name: &str) -> Vec<String> {
        let mut args = vec![
            "--params.user.username".to_string(),
            format!("{TEST_USER_PREFIX}{}", make_id()),
            "--params.user.email".to_string(),
            format!("{TEST_EMAIL_PREFIX}{}", make_id()),
            "--params.user.password".to_string(),
            TEST_USER_PASSWORD.to_string(),
            "--params.user.newPassword".to_string(),
            TEST_USER_NEW_PASSWORD.to_string(),
        ];
        if let Some(admin) = &run.admin {
            args.extend([
                "--params.admin.username".to_string(),
                admin.username.clone(),
                "--params.admin.password".to_string(),
                admin.password.clone(),
            ]);
        }
        args.push("--params.url".to_string());
        args.push(format!("{}{}", self.base_url, page_name.trim_start_matches('/')));
        args
    }

    /// Run suites in order. Page-mutating suites share the page file, so they
    /// never overlap.
    pub fn run_all(&self, runs: &[SuiteRun]) -> Result<Vec<TestOutcome>> {
        runs.iter().map(|run| self.run(run)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{DEV_PAGE, ScriptedAutomation, ScriptedRun, TestSite, capture_logs};

    fn admin() -> Option<AdminLogin> {
        Some(AdminLogin {
            username: "administrator".to_string(),
            password: "pw".to_string(),
        })
    }

    #[test]
    fn make_id_is_five_letters() {
        for _ in 0..20 {
            let id = make_id();
            assert_eq!(id.len(), 5);
            assert!(id.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn admin_password_is_required_for_login_suites() {
        let err = resolve_admin(Suite::DynamicContent, None, None).unwrap_err();
        assert!(err.to_string().contains("--password"));
        assert_eq!(
            resolve_admin(Suite::MessageOfTheDay, None, Some("pw")).expect("admin"),
            admin()
        );
        assert_eq!(
            resolve_admin(Suite::AuthenticationWelcomePage, None, None).expect("no admin"),
            None
        );
    }

    #[test]
    fn overrides_apply_during_run_and_are_restored() {
        let site = TestSite::new().expect("site");
        let automation = ScriptedAutomation::new([ScriptedRun::Pass]).observing(&site.ctx.page_path());
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::UserAdministrator, admin()).expect("run");
        let outcome = runner.run(&run).expect("outcome");
        assert!(outcome.passed);

        let seen = automation.seen();
        let (request, page_during_run) = &seen[0];
        assert!(page_during_run.as_deref().is_some_and(|p| p.contains(r#""firstTimeUse": false"#)));
        assert_eq!(request.spec, "./e2e/user-administration.e2e-spec.js");
        assert!(request.args.contains(&"--params.admin.password".to_string()));
        assert_eq!(
            request.args.last().map(String::as_str),
            Some("http://localhost:3000/index.html")
        );
        assert_eq!(site.read("index.html"), DEV_PAGE);
        assert!(
            site.read("app/shared/class/environment.class.ts")
                .contains("export const isTest: boolean = false")
        );
    }

    #[test]
    fn failed_suite_is_reported_not_raised() {
        let site = TestSite::new().expect("site");
        let automation = ScriptedAutomation::new([ScriptedRun::Fail]);
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::AuthenticationWelcomePage, None).expect("run");
        let outcome = runner.run(&run).expect("outcome");
        assert!(!outcome.passed);
        assert!(!automation.seen()[0].0.args.contains(&"--params.admin.username".to_string()));
        assert_eq!(site.read("index.html"), DEV_PAGE);
    }

    #[test]
    fn automation_error_restores_page_byte_for_byte() {
        let site = TestSite::new().expect("site");
        let automation = ScriptedAutomation::new([ScriptedRun::Error("browser crashed".to_string())]);
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::AuthenticationNoBootstrap, None).expect("run");
        let err = runner.run(&run).unwrap_err();
        assert!(err.to_string().contains("browser crashed"));
        assert_eq!(site.read("index.html"), DEV_PAGE);
    }

    #[test]
    fn restore_failure_is_logged_when_automation_also_fails() {
        let site = TestSite::new().expect("site");
        let page = site.ctx.page_path();
        let automation = ScriptedAutomation::new([ScriptedRun::Error("browser crashed".to_string())])
            .before_run(move || {
                // A non-empty directory in place of the page makes the restore rename fail.
                fs::remove_file(&page).expect("remove page");
                fs::create_dir_all(page.join("held")).expect("block page");
            });
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::AuthenticationNoBootstrap, None).expect("run");
        let (result, logs) = capture_logs(|| runner.run(&run));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("browser crashed"));
        assert!(logs.contains("failed to restore page after automation error"));
        assert!(logs.contains("ERROR"));
        assert!(site.path("index.html").is_dir());
    }

    #[test]
    fn login_free_suite_gets_no_admin_params() {
        let site = TestSite::new().expect("site");
        let automation = ScriptedAutomation::new([ScriptedRun::Pass]);
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::AuthenticationNoBootstrap, None).expect("run");
        runner.run(&run).expect("outcome");
        let args = &automation.seen()[0].0.args;
        assert!(!args.iter().any(|arg| arg.starts_with("--params.admin.")));
        assert!(args.contains(&"--params.user.newPassword".to_string()));
    }

    #[test]
    fn region_page_override_targets_that_page() {
        let site = TestSite::new().expect("site");
        site.write("us-west-2_index.html", DEV_PAGE).expect("region page");
        let automation =
            ScriptedAutomation::new([ScriptedRun::Pass]).observing(&site.path("us-west-2_index.html"));
        let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");

        let run = SuiteRun::new(Suite::AuthenticationWelcomePage, None)
            .expect("run")
            .on_page("us-west-2_index.html");
        runner.run(&run).expect("outcome");
        let seen = automation.seen();
        assert_eq!(
            seen[0].0.args.last().map(String::as_str),
            Some("http://localhost:3000/us-west-2_index.html")
        );
        assert_eq!(site.read("us-west-2_index.html"), DEV_PAGE);
    }

    #[test]
    fn all_order_runs_authentication_suites_first() {
        assert_eq!(ALL_SUITES[0], Suite::AuthenticationNoBootstrap);
        assert_eq!(Suite::MessageOfTheDay.to_string(), "message-of-the-day");
    }
}
