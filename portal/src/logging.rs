//! Progress and diagnostic output for the portal tooling.
//!
//! Everything goes through `tracing` to stderr. Stdout is reserved for
//! command results (administrator credentials, deleted paths).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "portal=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Output: stderr,
/// compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=portal=debug portal serve
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
