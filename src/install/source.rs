//! Configure, make, make install from a source tarball.

use camino::Utf8Path;
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use super::archive::{staging_dir, unpack_into};
use crate::command::{CommandRunner, Invocation, render_failure};
use crate::error::ProvisionError;
use crate::fs::{ensure_dir_exists, sole_subdirectory};
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

/// Builds PostgreSQL from the `url` tarball and installs it under the install root.
///
/// # Errors
/// Returns an error when no source URL is configured, the tarball cannot be
/// unpacked, or any build step exits unsuccessfully.
pub fn build_from_source(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> Result<()> {
    let url = cfg
        .source()
        .url
        .as_deref()
        .ok_or_else(|| eyre!("neither url-bin nor url is set, nothing to build from"))?;
    let root = cfg.install_root();
    let parent = root
        .parent()
        .ok_or_else(|| eyre!("install root {root} has no parent directory"))?;
    ensure_dir_exists(parent)?;

    let staging = staging_dir(parent)?;
    info!(target: LOG_TARGET, url, "compiling PostgreSQL");
    unpack_into(url, &staging.path)?;
    let tree = sole_subdirectory(&staging.path)?.unwrap_or_else(|| staging.path.clone());

    let configure = Invocation::new(tree.join("configure"))
        .arg(format!("--prefix={root}"))
        .args(cfg.source().configure_options.iter().cloned());
    run_step(runner, configure, &tree, "configure")?;
    run_step(runner, Invocation::new("make"), &tree, "make")?;
    run_step(runner, Invocation::new("make").arg("install"), &tree, "make install")
}

fn run_step(
    runner: &dyn CommandRunner,
    command: Invocation,
    tree: &Utf8Path,
    step: &str,
) -> Result<()> {
    let invocation = command.current_dir(tree).capture_output();
    info!(target: LOG_TARGET, step, "running build step");
    let output = runner
        .run(&invocation)
        .map_err(ProvisionError::into_report)?;
    if output.success() {
        Ok(())
    } else {
        Err(render_failure(&format!("{step} failed"), &output))
    }
}
