//! I/O for portal commands: files, child processes and the external tools.

pub mod automation;
pub mod cloud_cli;
pub mod config;
pub mod files;
pub mod link;
pub mod process;
pub mod server;
pub mod settings_store;
pub mod toolchain;
pub mod workspace;
