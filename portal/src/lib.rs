//! Build, bootstrap and e2e tooling for the Cloud Gem Portal.
//!
//! The crate keeps a strict split between:
//!
//! - **[`core`]**: Pure text transforms and CLI-output adapters (loader config
//!   transpiling, page regions, bootstrap capture, stack status parsing).
//!   No I/O.
//! - **[`io`]**: Side effects (files, child processes, the cloud CLI, the dev
//!   server, browser automation). Each external collaborator sits behind a
//!   trait so tests can script it.
//!
//! Orchestration modules ([`orchestrate`], [`environment`], [`dist`],
//! [`testrun`], [`regions`]) combine the two to implement the CLI commands,
//! all resolved against a [`context::SiteContext`].

pub mod context;
pub mod core;
pub mod dist;
pub mod environment;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
pub mod regions;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod testrun;
