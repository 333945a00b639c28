//! Core, deterministic logic for the portal tooling.
//!
//! Nothing in here touches the filesystem or spawns processes; page text, CLI
//! output and config text come in as strings and typed results go out.

pub mod bootstrap;
pub mod defines;
pub mod errors;
pub mod loader_config;
pub mod page;
pub mod rewrite;
pub mod settings;
pub mod stack;
