//! Internal helpers re-exported for integration tests.
//!
//! The [`RecordingRunner`] stands in for the host's process table so the full
//! lifecycle can be exercised without PostgreSQL installed, and the logging
//! helpers capture tracing output for assertions.

mod fixtures;
mod logging;
mod runner;

pub use self::fixtures::{option_map, preinstalled, sandbox_context, utf8_tempdir, write_tarball};
pub use self::logging::{capture_info_logs, capture_warn_logs};
pub use self::runner::{
    RecordingRunner, SIMULATED_SETTINGS, settings_output, simulated_postgres, simulated_response,
};
