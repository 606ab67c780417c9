//! Shared tracing configuration for observability instrumentation.
//!
//! Centralises the log target used by the crate so subscribers can filter
//! lifecycle events without pulling in unrelated application logs.

use tracing_subscriber::EnvFilter;

/// Target used by lifecycle spans and logs.
pub(crate) const LOG_TARGET: &str = "pg_provision::observability";

/// Installs a `fmt` subscriber honouring `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` when another subscriber was already installed, which is the
/// normal case when the recipe runs inside a host that configured tracing.
#[must_use]
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
