//! Structured errors raised by extraction sites.
//!
//! Each variant names the place where a required pattern failed to match, so
//! callers can decide whether the condition is tolerable or fatal. They travel
//! inside `anyhow::Error` and are recovered with `downcast_ref`.

use thiserror::Error;

use crate::core::page::Region;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The `System.config(...)` call could not be located.
    #[error("malformed loader config: {reason}")]
    MalformedConfig { reason: String },

    /// The normalized loader config block is not valid JSON.
    #[error("loader config is not parseable after normalization: {reason}")]
    ConfigParse { reason: String },

    /// A page region that must exist exactly once was not found.
    #[error("page region {region} not found")]
    RegionMissing { region: Region },

    /// A page region that must exist exactly once matched several times.
    #[error("page region {region} matched {count} times (expected exactly one)")]
    RegionAmbiguous { region: Region, count: usize },

    /// The dev server script does not contain a `server.listen(...)` call.
    #[error("no server.listen(...) call found in server script")]
    ServerPortNotFound,

    /// The CLI output does not name the local project settings file.
    #[error("local project settings path not found in CLI output")]
    SettingsPathNotFound,

    /// The local project settings file is not a JSON object.
    #[error("local project settings are not a JSON object: {reason}")]
    SettingsParse { reason: String },

    /// The local project settings could not be serialized.
    #[error("local project settings could not be encoded: {reason}")]
    SettingsEncode { reason: String },
}
