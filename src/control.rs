//! Starts and stops the server through the rendered `pgctl` script.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, info_span, warn};

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::ProvisionResult;
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

const CONTROL_SCRIPT: &str = "pgctl";

/// Handle for a server started by [`start`]; consumed by [`stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a started server should be stopped"]
pub struct ServerProcess {
    script: Utf8PathBuf,
    launcher_exit: Option<i32>,
}

impl ServerProcess {
    /// Control script that started the server.
    #[must_use]
    pub fn script(&self) -> &Utf8Path {
        &self.script
    }

    /// Exit code of `pgctl start`; `None` when it was killed by a signal.
    #[must_use]
    pub const fn launcher_exit(&self) -> Option<i32> {
        self.launcher_exit
    }
}

/// Runs `pgctl start` and waits for the launcher to exit.
///
/// The launcher's exit status is only logged; whether the server actually
/// came up is decided by the readiness poller.
///
/// # Errors
/// Returns an error when the control script cannot be run at all.
pub fn start(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> ProvisionResult<ServerProcess> {
    let script = cfg.script(CONTROL_SCRIPT);
    let _span = info_span!(target: LOG_TARGET, "start", script = %script).entered();
    info!(target: LOG_TARGET, "starting PostgreSQL");
    let output = runner.run(&Invocation::new(script.clone()).arg("start"))?;
    warn_on_failure("start", &output);
    Ok(ServerProcess {
        script,
        launcher_exit: output.exit_code,
    })
}

/// Runs `pgctl stop` for a server started by [`start`].
///
/// # Errors
/// Returns an error when the control script cannot be run at all. A non-zero
/// exit is logged rather than returned.
pub fn stop(runner: &dyn CommandRunner, server: ServerProcess) -> ProvisionResult<()> {
    let _span = info_span!(target: LOG_TARGET, "stop", script = %server.script).entered();
    info!(target: LOG_TARGET, "stopping PostgreSQL");
    let output = runner.run(&Invocation::new(server.script).arg("stop"))?;
    warn_on_failure("stop", &output);
    Ok(())
}

fn warn_on_failure(action: &str, output: &CommandOutput) {
    if !output.success() {
        warn!(
            target: LOG_TARGET,
            action,
            exit_code = ?output.exit_code,
            "pgctl exited unsuccessfully"
        );
    }
}
