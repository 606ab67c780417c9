//! Creates the database cluster with `initdb`.

use camino::Utf8Path;
use color_eyre::eyre::Context;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::command::{CommandRunner, Invocation, render_failure};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::{ensure_dir_exists, read_to_string, set_permissions};
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

const DATA_DIR_MODE: u32 = 0o700;

/// Result of [`create_cluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterOutcome {
    /// `initdb` populated a fresh data directory.
    ClusterCreated,
    /// The data directory already existed; nothing was run.
    ClusterAlreadyExists,
}

/// Initialises the cluster unless its data directory already exists.
///
/// An existing data directory is treated as an existing cluster whatever its
/// contents, so repeated runs never touch live data.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::ClusterInit`] error when `initdb` cannot be
/// run or exits unsuccessfully, and [`ProvisionErrorKind::Io`] when the data
/// directory cannot be created.
pub fn create_cluster(
    cfg: &InstanceConfig,
    runner: &dyn CommandRunner,
) -> ProvisionResult<ClusterOutcome> {
    let data_dir = cfg.data_dir();
    let _span = info_span!(target: LOG_TARGET, "create_cluster", data_dir = %data_dir).entered();

    if data_dir.exists() {
        warn!(
            target: LOG_TARGET,
            data_dir = %data_dir,
            "cluster directory already exists, skipping creation of a new one"
        );
        if let Some(version) = read_pg_version(data_dir) {
            info!(target: LOG_TARGET, pg_version = %version, "found existing cluster");
        }
        return Ok(ClusterOutcome::ClusterAlreadyExists);
    }

    ensure_dir_exists(data_dir)
        .and_then(|()| set_permissions(data_dir, DATA_DIR_MODE))
        .with_context(|| format!("unable to prepare data directory {data_dir}"))
        .map_err(|report| ProvisionError::new(ProvisionErrorKind::Io, report))?;

    let invocation = Invocation::new(cfg.binary("initdb"))
        .args(["-D", data_dir.as_str(), "-U", cfg.admin()])
        .capture_output();
    info!(target: LOG_TARGET, admin = cfg.admin(), "running initdb");
    let output = runner
        .run(&invocation)
        .map_err(|err| ProvisionError::new(ProvisionErrorKind::ClusterInit, err.into_report()))?;
    if !output.success() {
        return Err(ProvisionError::new(
            ProvisionErrorKind::ClusterInit,
            render_failure(&format!("initdb failed for {data_dir}"), &output),
        ));
    }

    info!(target: LOG_TARGET, "cluster created");
    Ok(ClusterOutcome::ClusterCreated)
}

/// Reads the major version recorded in `<data_dir>/PG_VERSION`, if present.
#[must_use]
pub fn read_pg_version(data_dir: &Utf8Path) -> Option<String> {
    let path = data_dir.join("PG_VERSION");
    if !path.is_file() {
        return None;
    }
    read_to_string(&path)
        .ok()
        .map(|text| text.trim().to_owned())
        .filter(|version| !version.is_empty())
}
