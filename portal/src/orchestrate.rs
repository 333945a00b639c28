//! Environment bootstrap state machine.
//!
//! ```text
//! CheckLocalBootstrap --found--> StartServer
//!        | missing
//!        v
//! CheckRemoteStack --exists--> WriteBootstrap --written--> StartServer
//!        | absent                   | not found
//!        v                          v
//! CreateStack --failed-------> ReportAndAbort
//!        | created
//!        v
//! WriteBootstrap
//! ```
//!
//! Each state has a transition function returning a tagged [`Transition`]; the
//! driver loop only follows tags and never inspects CLI text itself.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::core::bootstrap::{capture_bootstrap, inject_bootstrap};
use crate::core::stack::{AdminCredentials, ProvisionFailure, StackPresence, project_stack_name};
use crate::io::cloud_cli::{BootstrapLookup, CloudCli, LmbrAws, StackCreation};
use crate::io::files::{read_required, write_file};
use crate::io::server::{DevServer, ServerHandle};

/// Named states of the bootstrap machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    CheckLocalBootstrap,
    CheckRemoteStack,
    CreateStack,
    WriteBootstrap,
    StartServer,
    ReportAndAbort,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::CheckLocalBootstrap => "check-local-bootstrap",
            State::CheckRemoteStack => "check-remote-stack",
            State::CreateStack => "create-stack",
            State::WriteBootstrap => "write-bootstrap",
            State::StartServer => "start-server",
            State::ReportAndAbort => "report-and-abort",
        };
        f.write_str(name)
    }
}

/// Result of one transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The step succeeded; continue at the given state.
    Advance(State),
    /// The step found nothing usable; escalate to the given state.
    Escalate(State),
    /// Terminal failure.
    Fail(ProvisionFailure),
}

/// How the machine ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// A bootstrap is in place; the server may start.
    Ready {
        credentials: Option<AdminCredentials>,
        path: Vec<State>,
    },
    Aborted {
        failure: ProvisionFailure,
        path: Vec<State>,
    },
}

/// Inputs for one run of the machine.
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    /// Page checked for an existing bootstrap and used as the injection source.
    pub page: PathBuf,
    /// Where the injected page is written (the page itself unless redirected).
    pub output: PathBuf,
    /// Region for stack creation.
    pub region: String,
    /// Passed as `--region-override` when asking for the bootstrap.
    pub region_override: Option<String>,
    /// Engine root shown in remediation guidance.
    pub engine_root: PathBuf,
    /// Name used if a project stack has to be created.
    pub stack_name: String,
}

impl BootstrapPlan {
    /// Plan for the canonical page: read and written in place.
    pub fn for_page(page: PathBuf, region: &str, engine_root: &Path) -> Self {
        Self {
            output: page.clone(),
            page,
            region: region.to_string(),
            region_override: None,
            engine_root: engine_root.to_path_buf(),
            stack_name: project_stack_name(Utc::now().timestamp_millis()),
        }
    }
}

/// Drives the bootstrap machine against a cloud CLI.
pub struct Orchestrator<'a, C: CloudCli> {
    aws: LmbrAws<'a, C>,
    plan: BootstrapPlan,
    credentials: Option<AdminCredentials>,
}

impl<'a, C: CloudCli> Orchestrator<'a, C> {
    pub fn new(cli: &'a C, plan: BootstrapPlan) -> Self {
        Self {
            aws: LmbrAws::new(cli),
            plan,
            credentials: None,
        }
    }

    /// Run from `CheckLocalBootstrap` until `StartServer` or `ReportAndAbort`.
    #[instrument(skip_all, fields(page = %self.plan.page.display(), region = %self.plan.region))]
    pub fn ensure_bootstrap(mut self) -> Result<Provisioned> {
        let mut state = State::CheckLocalBootstrap;
        let mut path = vec![state];
        let mut failure = None;
        loop {
            let transition = match state {
                State::CheckLocalBootstrap => self.check_local_bootstrap()?,
                State::CheckRemoteStack => self.check_remote_stack()?,
                State::CreateStack => self.create_stack()?,
                State::WriteBootstrap => self.write_bootstrap()?,
                State::StartServer => {
                    return Ok(Provisioned::Ready {
                        credentials: self.credentials,
                        path,
                    });
                }
                State::ReportAndAbort => {
                    let failure = failure
                        .take()
                        .ok_or_else(|| anyhow!("aborted without a failure report"))?;
                    report_failure(&failure, &self.plan.engine_root);
                    return Ok(Provisioned::Aborted { failure, path });
                }
            };
            state = match transition {
                Transition::Advance(next) | Transition::Escalate(next) => next,
                Transition::Fail(reason) => {
                    failure = Some(reason);
                    State::ReportAndAbort
                }
            };
            path.push(state);
        }
    }

    /// Presence of a complete bootstrap is enough; values are not validated.
    pub fn check_local_bootstrap(&self) -> Result<Transition> {
        let page = read_required(&self.plan.page)?;
        if capture_bootstrap(&page).is_some() {
            info!("Bootstrap found");
            Ok(Transition::Advance(State::StartServer))
        } else {
            info!("No bootstrap found in page; checking for a project stack");
            Ok(Transition::Escalate(State::CheckRemoteStack))
        }
    }

    pub fn check_remote_stack(&self) -> Result<Transition> {
        match self.aws.portal_stack()? {
            StackPresence::Present { status } => {
                info!(%status, "A project stack exists");
                Ok(Transition::Advance(State::WriteBootstrap))
            }
            StackPresence::Transitional { status } => {
                warn!(%status, "project stack is mid-update; using it anyway");
                Ok(Transition::Advance(State::WriteBootstrap))
            }
            StackPresence::Absent => {
                info!("No project stack found; creating one");
                Ok(Transition::Escalate(State::CreateStack))
            }
        }
    }

    pub fn create_stack(&mut self) -> Result<Transition> {
        match self
            .aws
            .create_project_stack(&self.plan.stack_name, &self.plan.region)?
        {
            StackCreation::Created { credentials } => {
                if let Some(creds) = &credentials {
                    info!(
                        username = %creds.username,
                        password = %creds.password,
                        "Administrator account created; keep these credentials"
                    );
                }
                self.credentials = credentials;
                Ok(Transition::Advance(State::WriteBootstrap))
            }
            StackCreation::Failed(failure) => Ok(Transition::Fail(failure)),
        }
    }

    pub fn write_bootstrap(&self) -> Result<Transition> {
        match write_bootstrap(
            &self.aws,
            &self.plan.page,
            &self.plan.output,
            self.plan.region_override.as_deref(),
        )? {
            BootstrapLookup::Found(_) => Ok(Transition::Advance(State::StartServer)),
            BootstrapLookup::NotFound(failure) => Ok(Transition::Fail(failure)),
        }
    }
}

/// Ask the CLI for the bootstrap and inject it into `page`, writing `output`.
///
/// Nothing is written when the CLI output carries no complete bootstrap.
pub fn write_bootstrap<C: CloudCli>(
    aws: &LmbrAws<'_, C>,
    page: &Path,
    output: &Path,
    region_override: Option<&str>,
) -> Result<BootstrapLookup> {
    let lookup = aws.bootstrap(region_override)?;
    if let BootstrapLookup::Found(record) = &lookup {
        let source = read_required(page)?;
        let injected = inject_bootstrap(&source, record)
            .with_context(|| format!("inject bootstrap into {}", page.display()))?;
        write_file(output, &injected)?;
        info!(output = %output.display(), "wrote local bootstrap");
    }
    Ok(lookup)
}

/// Log the failure bundle: summary, raw CLI output, then static guidance.
pub fn report_failure(failure: &ProvisionFailure, engine_root: &Path) {
    error!("{}", failure.summary);
    error!(
        exit_code = ?failure.exit_code,
        stdout = %failure.stdout,
        stderr = %failure.stderr,
        "cloud cli output"
    );
    for hint in &failure.hints {
        error!("{}", hint.message(engine_root));
    }
}

/// Outcome of bootstrapping and starting the dev server.
#[derive(Debug)]
pub enum ServeOutcome {
    Serving {
        server: ServerHandle,
        credentials: Option<AdminCredentials>,
    },
    Aborted(ProvisionFailure),
}

/// Run the machine and start `server` when it ends in `StartServer`.
pub fn bootstrap_and_serve<C: CloudCli, S: DevServer>(
    cli: &C,
    plan: BootstrapPlan,
    server: &S,
) -> Result<ServeOutcome> {
    match Orchestrator::new(cli, plan).ensure_bootstrap()? {
        Provisioned::Ready { credentials, .. } => {
            info!("Starting the local web server");
            let server = server.start().context("start dev server")?;
            Ok(ServeOutcome::Serving {
                server,
                credentials,
            })
        }
        Provisioned::Aborted { failure, .. } => Ok(ServeOutcome::Aborted(failure)),
    }
}
