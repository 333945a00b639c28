//! Stable exit codes for portal CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments, configuration or layout, or any unexpected error.
pub const INVALID: i32 = 1;
/// The project stack or bootstrap could not be provisioned.
pub const PROVISION_FAILED: i32 = 2;
/// At least one e2e suite failed.
pub const TESTS_FAILED: i32 = 3;
