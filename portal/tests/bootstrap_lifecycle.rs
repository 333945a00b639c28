//! Lifecycle tests across the bootstrap machine and the suite runner.
//!
//! These drive the public orchestration API with scripted collaborators: a
//! cloud CLI answering from canned output, a dev server that only counts
//! starts, and automation that replays scripted results.

use portal::core::defines::{Define, apply_define};
use portal::core::stack::ProvisionStage;
use portal::orchestrate::{
    BootstrapPlan, Orchestrator, Provisioned, ServeOutcome, State, bootstrap_and_serve,
};
use portal::test_support::{
    BOOTSTRAP_OUTPUT, DEV_PAGE, ENVIRONMENT_FILE, RecordingServer, ScriptedAutomation,
    ScriptedCli, ScriptedRun, TestSite,
};
use portal::testrun::{AdminLogin, Suite, SuiteRun, TestRunner};

const STACK_ABSENT: &str = "Name  Type  Status\n";
const CREATE_OUTPUT: &str = "\
Creating stack CGPProjStk00000001
Stack 'CGPProjStk00000001' update complete
Username: administrator
Password: S3cret!
";

fn plan(site: &TestSite) -> BootstrapPlan {
    BootstrapPlan {
        stack_name: "CGPProjStk00000001".to_string(),
        ..BootstrapPlan::for_page(site.ctx.page_path(), "us-east-1", &site.ctx.engine_root)
    }
}

fn bootstrapped_page() -> String {
    DEV_PAGE.replace(
        "var bootstrap = {}",
        "var bootstrap = {\"identityPoolId\": \"us-east-1:pool\", \"projectConfigBucketId\": \"cfg-bucket\", \"userPoolId\": \"us-east-1_abc\", \"region\": \"us-east-1\", \"clientId\": \"client123\"}",
    )
}

#[test]
fn local_bootstrap_starts_server_without_cli_calls() {
    let site = TestSite::new().expect("site");
    site.write("index.html", &bootstrapped_page()).expect("page");
    let cli = ScriptedCli::new();
    let server = RecordingServer::default();

    let outcome = bootstrap_and_serve(&cli, plan(&site), &server).expect("serve");

    assert!(matches!(outcome, ServeOutcome::Serving { credentials: None, .. }));
    assert!(cli.calls().is_empty());
    assert_eq!(server.starts(), 1);
    assert_eq!(site.read("index.html"), bootstrapped_page());
}

#[test]
fn fresh_environment_creates_stack_then_injects_bootstrap() {
    let site = TestSite::new().expect("site");
    let cli = ScriptedCli::new()
        .respond("project list-resources", STACK_ABSENT)
        .respond("project create", CREATE_OUTPUT)
        .respond("cloud-gem-framework cloud-gem-portal", BOOTSTRAP_OUTPUT);

    let provisioned = Orchestrator::new(&cli, plan(&site))
        .ensure_bootstrap()
        .expect("run");

    let Provisioned::Ready { credentials, path } = provisioned else {
        panic!("expected ready, got {provisioned:?}");
    };
    assert_eq!(
        path,
        vec![
            State::CheckLocalBootstrap,
            State::CheckRemoteStack,
            State::CreateStack,
            State::WriteBootstrap,
            State::StartServer,
        ]
    );
    let credentials = credentials.expect("credentials");
    assert_eq!(credentials.username, "administrator");
    assert_eq!(credentials.password, "S3cret!");

    let page = site.read("index.html");
    assert!(page.contains("\"clientId\": \"client123\""));
    assert!(!page.contains("var bootstrap = {}"));
}

#[test]
fn missing_bootstrap_aborts_before_server_start() {
    let site = TestSite::new().expect("site");
    let cli = ScriptedCli::new()
        .respond(
            "project list-resources",
            "CloudGemPortal  AWS::S3::Bucket  CREATE_COMPLETE\n",
        )
        .respond(
            "cloud-gem-framework cloud-gem-portal",
            "{\"identityPoolId\": \"p\", \"userPoolId\": \"u\", \"region\": \"r\", \"clientId\": \"c\"}\n",
        );
    let server = RecordingServer::default();

    let outcome = bootstrap_and_serve(&cli, plan(&site), &server).expect("serve");

    let ServeOutcome::Aborted(failure) = outcome else {
        panic!("expected abort");
    };
    assert_eq!(failure.stage, ProvisionStage::WriteBootstrap);
    assert!(failure.stdout.contains("identityPoolId"));
    assert_eq!(server.starts(), 0);
    assert_eq!(site.read("index.html"), DEV_PAGE);
}

#[test]
fn suite_runs_restore_page_and_test_define_on_every_outcome() {
    let site = TestSite::new().expect("site");
    site.write("index.html", &bootstrapped_page()).expect("page");
    let automation = ScriptedAutomation::new([
        ScriptedRun::Pass,
        ScriptedRun::Fail,
        ScriptedRun::Error("browser crashed".to_string()),
    ])
    .observing(&site.path("index.html"));
    let runner = TestRunner::new(&site.ctx, &automation, "http://localhost:3000/");
    let admin = AdminLogin {
        username: "administrator".to_string(),
        password: "pw".to_string(),
    };

    let passed = runner
        .run(&SuiteRun::new(Suite::AuthenticationNoBootstrap, None).expect("run"))
        .expect("pass");
    assert!(passed.passed);
    let failed = runner
        .run(&SuiteRun::new(Suite::MessageOfTheDay, Some(admin.clone())).expect("run"))
        .expect("fail");
    assert!(!failed.passed);
    let err = runner
        .run(&SuiteRun::new(Suite::DynamicContent, Some(admin)).expect("run"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("browser crashed"));

    let seen = automation.seen();
    assert_eq!(seen.len(), 3);
    let during_no_bootstrap = seen[0].1.as_deref().expect("observed");
    assert!(during_no_bootstrap.contains("var bootstrap = {}"));
    let during_motd = seen[1].1.as_deref().expect("observed");
    assert!(during_motd.contains("\"firstTimeUse\": false"));

    assert_eq!(site.read("index.html"), bootstrapped_page());
    assert_eq!(
        site.read("app/shared/class/environment.class.ts"),
        apply_global_defines_only()
    );
}

/// Environment file after a test-on/test-off cycle: the global defines are
/// present and both mode flags are off.
fn apply_global_defines_only() -> String {
    apply_define(ENVIRONMENT_FILE, Define::Test(false), &[])
}
