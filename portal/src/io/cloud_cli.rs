//! Cloud CLI seam.
//!
//! [`CloudCli`] is the raw invocation boundary (argv in, text out). [`LmbrAws`]
//! sits on top of it and turns the text into explicit result types; tests swap
//! in a scripted CLI and never spawn processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::bootstrap::{BootstrapRecord, capture_bootstrap};
use crate::core::stack::{
    AdminCredentials, ProvisionFailure, StackPresence, classify_portal_stack, scrape_credentials,
    settings_path_from_output, stack_creation_completed,
};
use crate::io::process::{command_in, run_command};

/// Captured result of one CLI call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Abstraction over the cloud resource CLI.
pub trait CloudCli {
    /// Run the CLI with `args` and return its output. Non-zero exits are not errors
    /// here; only failing to run the CLI at all is.
    fn invoke(&self, args: &[String]) -> Result<CliOutput>;
}

/// CLI spawned as a child process from the engine root.
///
/// The working directory is passed to every child explicitly, so concurrent
/// invocations never race on the process-wide current directory.
#[derive(Debug, Clone)]
pub struct ProcessCli {
    pub command: Vec<String>,
    pub engine_root: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CloudCli for ProcessCli {
    #[instrument(skip_all, fields(engine_root = %self.engine_root.display()))]
    fn invoke(&self, args: &[String]) -> Result<CliOutput> {
        let argv: Vec<String> = self.command.iter().chain(args).cloned().collect();
        debug!(argv = ?argv, "invoking cloud cli");
        let cmd = command_in(&argv, &self.engine_root)?;
        let output = run_command(cmd, Some(self.timeout), self.output_limit_bytes)
            .with_context(|| format!("run {}", argv.join(" ")))?;
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "cloud cli timed out");
        }
        Ok(CliOutput {
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            exit_code: output.status.code(),
        })
    }
}

/// Result of a project stack creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCreation {
    /// Completion reported. Credentials are `None` when the output did not carry them.
    Created {
        credentials: Option<AdminCredentials>,
    },
    Failed(ProvisionFailure),
}

/// Result of asking the CLI for the bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapLookup {
    Found(BootstrapRecord),
    NotFound(ProvisionFailure),
}

/// Typed operations over the `lmbr_aws` command set.
pub struct LmbrAws<'a, C: CloudCli> {
    cli: &'a C,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

impl<'a, C: CloudCli> LmbrAws<'a, C> {
    pub fn new(cli: &'a C) -> Self {
        Self { cli }
    }

    /// Whether the project stack hosting the portal exists.
    pub fn portal_stack(&self) -> Result<StackPresence> {
        let output = self
            .cli
            .invoke(&args(&["project", "list-resources"]))
            .context("list project resources")?;
        debug!(stdout = %output.stdout, stderr = %output.stderr, "list-resources output");
        Ok(classify_portal_stack(&output.stdout))
    }

    /// Create a project stack named `stack_name` in `region`.
    pub fn create_project_stack(&self, stack_name: &str, region: &str) -> Result<StackCreation> {
        info!(stack_name, region, "creating project stack");
        let output = self
            .cli
            .invoke(&args(&[
                "project",
                "create",
                "--stack-name",
                stack_name,
                "--confirm-aws-usage",
                "--confirm-security-change",
                "--region",
                region,
            ]))
            .context("create project stack")?;
        debug!(stdout = %output.stdout, stderr = %output.stderr, "project create output");

        if !stack_creation_completed(&output.stdout) {
            return Ok(StackCreation::Failed(ProvisionFailure::create_stack(
                output.stdout,
                output.stderr,
                output.exit_code,
            )));
        }
        let credentials = scrape_credentials(&output.stdout);
        if credentials.is_none() {
            warn!("stack created but no administrator credentials were reported");
        }
        Ok(StackCreation::Created { credentials })
    }

    /// Ask for the bootstrap configuration, optionally for another region.
    pub fn bootstrap(&self, region_override: Option<&str>) -> Result<BootstrapLookup> {
        let mut argv = args(&[
            "cloud-gem-framework",
            "cloud-gem-portal",
            "--show-bootstrap-configuration",
        ]);
        if let Some(region) = region_override {
            argv.push("--region-override".to_string());
            argv.push(region.to_string());
        }
        let output = self.cli.invoke(&argv).context("show bootstrap configuration")?;
        debug!(stdout = %output.stdout, stderr = %output.stderr, "bootstrap output");

        Ok(match capture_bootstrap(&output.stdout) {
            Some(record) => BootstrapLookup::Found(record),
            None => BootstrapLookup::NotFound(ProvisionFailure::bootstrap_missing(
                output.stdout,
                output.stderr,
                output.exit_code,
            )),
        })
    }

    /// Path of the local project settings file.
    pub fn settings_path(&self) -> Result<PathBuf> {
        let output = self
            .cli
            .invoke(&args(&["cloud-gem-framework", "paths"]))
            .context("read cloud gem framework paths")?;
        let path = settings_path_from_output(&output.stdout)?;
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::ProvisionStage;
    use crate::test_support::ScriptedCli;

    const BOOTSTRAP: &str = r#"{"identityPoolId": "ip", "projectConfigBucketId": "b", "userPoolId": "up", "region": "us-east-1", "clientId": "c"}"#;

    #[test]
    fn create_reports_credentials() {
        let cli = ScriptedCli::new().respond(
            "project create",
            "Stack 'CGPProjStk123' update complete\nUsername: administrator\nPassword: Pa55!\n",
        );
        let creation = LmbrAws::new(&cli)
            .create_project_stack("CGPProjStk123", "us-east-1")
            .expect("create");
        assert_eq!(
            creation,
            StackCreation::Created {
                credentials: Some(AdminCredentials {
                    username: "administrator".to_string(),
                    password: "Pa55!".to_string(),
                })
            }
        );
        assert_eq!(
            cli.calls()[0],
            args(&[
                "project",
                "create",
                "--stack-name",
                "CGPProjStk123",
                "--confirm-aws-usage",
                "--confirm-security-change",
                "--region",
                "us-east-1",
            ])
        );
    }

    #[test]
    fn create_without_completion_is_failure() {
        let cli = ScriptedCli::new().respond("project create", "Stack rollback in progress");
        let creation = LmbrAws::new(&cli)
            .create_project_stack("CGPProjStk1", "us-east-1")
            .expect("create");
        let StackCreation::Failed(failure) = creation else {
            panic!("expected failure, got {creation:?}");
        };
        assert_eq!(failure.stage, ProvisionStage::CreateStack);
        assert_eq!(failure.stdout, "Stack rollback in progress");
    }

    #[test]
    fn bootstrap_passes_region_override() {
        let cli = ScriptedCli::new().respond("cloud-gem-framework cloud-gem-portal", BOOTSTRAP);
        let lookup = LmbrAws::new(&cli).bootstrap(Some("eu-west-1")).expect("lookup");
        assert!(matches!(lookup, BootstrapLookup::Found(_)));
        let call = &cli.calls()[0];
        assert_eq!(&call[call.len() - 2..], ["--region-override", "eu-west-1"]);
    }

    #[test]
    fn bootstrap_missing_is_not_found() {
        let cli = ScriptedCli::new().respond("cloud-gem-framework cloud-gem-portal", "no deployment");
        let lookup = LmbrAws::new(&cli).bootstrap(None).expect("lookup");
        assert!(matches!(lookup, BootstrapLookup::NotFound(_)));
    }

    #[test]
    fn settings_path_requires_marker() {
        let cli = ScriptedCli::new().respond("cloud-gem-framework paths", "Game Directory /g\n");
        assert!(LmbrAws::new(&cli).settings_path().is_err());
    }
}
