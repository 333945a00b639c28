//! Browser automation seam for the e2e suites.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::io::process::{command_in, run_command};

/// One automation invocation: a spec file plus named `--params.*` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationRequest {
    /// Spec file relative to the portal root.
    pub spec: String,
    /// Flat argument vector appended after the spec.
    pub args: Vec<String>,
}

/// What the automation reported. Only pass/fail is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationReport {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

pub trait BrowserAutomation {
    /// Run one spec. `Err` means the automation could not be run at all; failing
    /// specs come back as a report with `passed == false`.
    fn run(&self, request: &AutomationRequest) -> Result<AutomationReport>;
}

/// Protractor launched from the portal root.
#[derive(Debug, Clone)]
pub struct ProtractorRunner {
    pub command: Vec<String>,
    pub config: PathBuf,
    pub portal_root: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ProtractorRunner {
    fn argv(&self, request: &AutomationRequest) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.push(self.config.to_string_lossy().into_owned());
        argv.push("--specs".to_string());
        argv.push(request.spec.clone());
        argv.extend(request.args.iter().cloned());
        argv
    }
}

impl BrowserAutomation for ProtractorRunner {
    #[instrument(skip_all, fields(spec = %request.spec))]
    fn run(&self, request: &AutomationRequest) -> Result<AutomationReport> {
        let cmd = command_in(&self.argv(request), &self.portal_root)?;
        let output = run_command(cmd, Some(self.timeout), self.output_limit_bytes)
            .with_context(|| format!("run automation for {}", request.spec))?;

        let mut text = output.stdout_text();
        text.push_str(&output.stderr_text());
        for line in text.lines() {
            info!(target: "portal::automation", "{line}");
        }
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "automation timed out");
        }
        Ok(AutomationReport {
            passed: output.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }
}
