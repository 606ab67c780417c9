//! Recognised option keys and their defaults.

use std::num::NonZeroU32;

pub(crate) const ADMIN: &str = "admin";
pub(crate) const SUPERUSERS: &str = "superusers";
pub(crate) const USERS: &str = "users";
pub(crate) const URL_BIN: &str = "url-bin";
pub(crate) const SOURCE_URL: &str = "url";
pub(crate) const CONFIGURE_OPTIONS: &str = "configure-options";
pub(crate) const BIN_DIR: &str = "bin-dir";
pub(crate) const CONFIG_DIR: &str = "config-dir";
pub(crate) const PID_FILE: &str = "pid-file";
pub(crate) const SOCKET_DIR: &str = "socket-dir";
pub(crate) const LISTEN_ADDRESSES: &str = "listen_addresses";
pub(crate) const PORT: &str = "port";
pub(crate) const CONF_OVERRIDES: &str = "postgresql.conf";
pub(crate) const STARTUP_ATTEMPTS: &str = "startup-attempts";
pub(crate) const STARTUP_DELAY_MS: &str = "startup-delay-ms";

pub(crate) const DEFAULT_ADMIN: &str = "postgres";
pub(crate) const DEFAULT_SUPERUSERS: &str = "root";
pub(crate) const DEFAULT_PORT: u16 = 5432;
pub(crate) const DEFAULT_STARTUP_ATTEMPTS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(attempts) => attempts,
    None => NonZeroU32::MIN,
};
pub(crate) const DEFAULT_STARTUP_DELAY_MS: u64 = 500;

pub(crate) const BIN_SUBDIR: &str = "bin";
pub(crate) const DATA_SUBDIR: &str = "db";
pub(crate) const PID_FILE_NAME: &str = "postgresql.pid";

/// Server tuning knobs rendered into the bootstrap `postgresql.conf`, in
/// output order, with conservative defaults.
pub(crate) const TUNING_DEFAULTS: &[(&str, &str)] = &[
    ("ssl", "off"),
    ("shared_buffers", "24MB"),
    ("work_mem", "1MB"),
    ("temp_buffers", "8MB"),
    ("fsync", "on"),
    ("synchronous_commit", "on"),
    ("wal_sync_method", "fsync"),
    ("wal_buffers", "64kB"),
    ("client_min_messages", "notice"),
    ("log_min_messages", "notice"),
    ("log_error_verbosity", "default"),
    ("log_min_error_statement", "error"),
    ("log_min_duration_statement", "-1"),
    ("log_line_prefix", "%t "),
    ("track_activities", "on"),
    ("track_counts", "on"),
    ("log_parser_stats", "off"),
    ("log_planner_stats", "off"),
    ("log_executor_stats", "off"),
    ("log_statement_stats", "off"),
];

/// Keys consumed by the resolver itself; everything else that is not a tuning
/// knob is kept as a passthrough option.
pub(crate) const RECOGNISED: &[&str] = &[
    ADMIN,
    SUPERUSERS,
    USERS,
    URL_BIN,
    SOURCE_URL,
    CONFIGURE_OPTIONS,
    BIN_DIR,
    CONFIG_DIR,
    PID_FILE,
    SOCKET_DIR,
    LISTEN_ADDRESSES,
    PORT,
    CONF_OVERRIDES,
    STARTUP_ATTEMPTS,
    STARTUP_DELAY_MS,
];

pub(crate) fn is_tuning_key(key: &str) -> bool {
    TUNING_DEFAULTS.iter().any(|(name, _)| *name == key)
}

pub(crate) fn is_recognised(key: &str) -> bool {
    RECOGNISED.contains(&key) || is_tuning_key(key)
}
