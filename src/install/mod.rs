//! Acquires the PostgreSQL binaries for a part.
//!
//! The install root's existence is the only installation marker: when it is
//! present nothing is fetched or built. Otherwise a prebuilt archive is used
//! when `url-bin` is set, and the source build runs when it is not.

mod archive;
mod source;

pub use self::archive::{expand_arch, fetch_archive};
pub use self::source::build_from_source;

use color_eyre::eyre::WrapErr;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::command::CommandRunner;
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::remove_dir_all;
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

/// Whether a part's binaries are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationState {
    /// The install root does not exist.
    NotInstalled,
    /// The install root exists.
    Installed,
}

impl InstallationState {
    /// Inspects the install root of `cfg`.
    #[must_use]
    pub fn detect(cfg: &InstanceConfig) -> Self {
        if cfg.install_root().exists() {
            Self::Installed
        } else {
            Self::NotInstalled
        }
    }
}

/// Result of [`ensure_installed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallResult {
    /// The install root was already present.
    AlreadyInstalled,
    /// PostgreSQL was compiled from the source tarball.
    BuiltFromSource,
    /// A prebuilt archive was downloaded and unpacked.
    FetchedArchive,
}

/// Makes sure the PostgreSQL binaries are installed under the install root.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::Installation`] error when the download,
/// extraction or build fails. The partially populated install root is removed
/// before returning so the next run starts from scratch.
pub fn ensure_installed(
    cfg: &InstanceConfig,
    runner: &dyn CommandRunner,
) -> ProvisionResult<InstallResult> {
    let root = cfg.install_root();
    let _span = info_span!(target: LOG_TARGET, "ensure_installed", install_root = %root).entered();

    if InstallationState::detect(cfg) == InstallationState::Installed {
        info!(target: LOG_TARGET, "PostgreSQL already installed");
        return Ok(InstallResult::AlreadyInstalled);
    }

    let attempt = match cfg.archive_url() {
        Some(url) => expand_arch(url)
            .and_then(|expanded| fetch_archive(&expanded, root))
            .map(|()| InstallResult::FetchedArchive),
        None => build_from_source(cfg, runner).map(|()| InstallResult::BuiltFromSource),
    };

    attempt
        .inspect(|result| info!(target: LOG_TARGET, ?result, "PostgreSQL installed"))
        .inspect_err(|_| {
            if let Err(cleanup) = remove_dir_all(root) {
                warn!(
                    target: LOG_TARGET,
                    error = %cleanup,
                    "failed to remove partial install root"
                );
            }
        })
        .wrap_err("unable to install PostgreSQL")
        .map_err(|report| ProvisionError::new(ProvisionErrorKind::Installation, report))
}
