//! Refuses to provision as root.
//!
//! `initdb` and the server both exit immediately when started by root, so the
//! lifecycle is stopped before any file is touched.

use color_eyre::eyre::eyre;
use nix::unistd::{Uid, geteuid};

use crate::error::{ConfigError, ConfigResult};

/// Fails when the effective user is root.
///
/// # Errors
/// Returns a [`ConfigError`] naming the problem when running as root.
pub fn ensure_unprivileged() -> ConfigResult<()> {
    check_uid(geteuid())
}

fn check_uid(uid: Uid) -> ConfigResult<()> {
    if uid.is_root() {
        return Err(ConfigError::from(eyre!(
            "PostgreSQL refuses to run as root; run the recipe as an unprivileged user"
        )));
    }
    Ok(())
}
