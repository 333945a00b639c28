//! External build steps (stylesheets, TypeScript, bundling).

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{command_in, run_command};

const STEP_OUTPUT_LIMIT_BYTES: usize = 200_000;

/// Run each step in order from `cwd`, stopping at the first failure.
#[instrument(skip_all, fields(phase = %phase, steps = steps.len()))]
pub fn run_steps(phase: &str, steps: &[Vec<String>], cwd: &Path, timeout: Duration) -> Result<()> {
    for (idx, step) in steps.iter().enumerate() {
        let line = step.join(" ");
        info!(phase, step = idx + 1, command = %line, "running build step");
        let cmd = command_in(step, cwd)?;
        let output = run_command(cmd, Some(timeout), STEP_OUTPUT_LIMIT_BYTES)?;
        debug!(stdout = %output.stdout_text(), "build step stdout");
        if !output.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), timed_out = output.timed_out, stderr = %stderr, "build step failed");
            return Err(anyhow!(
                "{phase} step `{line}` failed with status {:?}{}",
                output.status.code(),
                if output.timed_out { " (timed out)" } else { "" }
            ));
        }
    }
    Ok(())
}
