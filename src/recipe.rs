//! Lifecycle entry points called by the orchestrator.
//!
//! [`Recipe::install`] runs every stage in order and returns the install root.
//! Repeated runs are safe: an existing install root skips the installer and an
//! existing data directory skips `initdb`, while the configuration and helper
//! scripts are rewritten every time.

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::cluster::{ClusterOutcome, create_cluster};
use crate::command::{CommandRunner, Invocation, SystemRunner};
use crate::control::{start, stop};
use crate::emit::{RenderedConfigSet, write_bootstrap_config};
use crate::error::{ConfigResult, ProvisionResult};
use crate::finalize::finalize_config;
use crate::install::{InstallResult, ensure_installed};
use crate::observability::LOG_TARGET;
use crate::provision::{RoleReport, create_superusers, create_users};
use crate::readiness::wait_until_ready;
use crate::settings::{InstanceConfig, OptionMap, RecipeContext};

/// Summary of a completed install or update run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Install root handed back to the orchestrator.
    pub install_root: Utf8PathBuf,
    /// What the installer did.
    pub install: InstallResult,
    /// What the cluster initialiser did.
    pub cluster: ClusterOutcome,
    /// Files written by the config emitter.
    pub rendered: RenderedConfigSet,
    /// Probes needed before the server accepted connections.
    pub readiness_attempts: u32,
    /// One entry per superuser and user, in creation order.
    pub roles: Vec<RoleReport>,
    /// Settings written to the finalised `postgresql.conf`.
    pub settings_written: usize,
}

/// Result of [`Recipe::uninstall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum UninstallOutcome {
    /// `pg_ctl` is absent, so no server can be running.
    NoBinaries,
    /// `pg_ctl stop` ran; a non-zero exit usually means nothing was running.
    StopAttempted {
        /// Exit code of `pg_ctl`.
        exit_code: Option<i32>,
    },
    /// `pg_ctl` could not be run at all.
    StopFailed {
        /// Why the stop could not be attempted.
        reason: String,
    },
}

/// Provisioning recipe for one part.
///
/// # Examples
/// ```no_run
/// use pg_provision::{OptionMap, Recipe, RecipeContext};
///
/// let context = RecipeContext::new("postgresql", "/srv/build/parts", "/srv/build/bin");
/// let mut options = OptionMap::new();
/// options.insert("users".into(), "app".into());
/// let recipe = Recipe::new(&context, &options)?;
/// let report = recipe.install()?;
/// assert!(report.install_root.ends_with("postgresql"));
/// # Ok::<(), pg_provision::PgProvisionError>(())
/// ```
#[derive(Debug)]
pub struct Recipe<R = SystemRunner> {
    config: InstanceConfig,
    runner: R,
}

impl Recipe<SystemRunner> {
    /// Resolves `options` for `context` and runs commands on the host.
    ///
    /// # Errors
    /// Returns a [`crate::ConfigError`] when the options cannot be resolved.
    pub fn new(context: &RecipeContext, options: &OptionMap) -> ConfigResult<Self> {
        Self::with_runner(context, options, SystemRunner)
    }
}

impl<R: CommandRunner> Recipe<R> {
    /// Resolves `options` for `context` and runs commands through `runner`.
    ///
    /// # Errors
    /// Returns a [`crate::ConfigError`] when the options cannot be resolved.
    pub fn with_runner(
        context: &RecipeContext,
        options: &OptionMap,
        runner: R,
    ) -> ConfigResult<Self> {
        InstanceConfig::resolve(context, options).map(|config| Self::from_config(config, runner))
    }

    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn from_config(config: InstanceConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Resolved configuration driving this recipe.
    #[must_use]
    pub const fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Command runner used by every stage.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs the full provisioning lifecycle.
    ///
    /// Once the server has been started it is stopped again whatever happens
    /// afterwards; a failure while stopping is logged and never hides the
    /// error that caused the early exit.
    ///
    /// # Errors
    /// Returns the first fatal stage error. Role creation failures are not
    /// fatal and are reported in [`InstallReport::roles`].
    pub fn install(&self) -> ProvisionResult<InstallReport> {
        let cfg = &self.config;
        let _span = info_span!(target: LOG_TARGET, "install", part = cfg.name()).entered();

        let install = ensure_installed(cfg, &self.runner)?;
        let cluster = create_cluster(cfg, &self.runner)?;
        let rendered = write_bootstrap_config(cfg)?;

        let server = start(cfg, &self.runner)?;
        let staged = self.while_running();
        let stopped = stop(&self.runner, server);
        let running = match (staged, stopped) {
            (Ok(running), Ok(())) => running,
            (Ok(_), Err(stop_err)) => return Err(stop_err),
            (Err(stage_err), stop_result) => {
                if let Err(stop_err) = stop_result {
                    warn!(
                        target: LOG_TARGET,
                        error = %stop_err,
                        "failed to stop PostgreSQL after an earlier error"
                    );
                }
                return Err(stage_err);
            }
        };

        info!(target: LOG_TARGET, install_root = %cfg.install_root(), "PostgreSQL part ready");
        Ok(InstallReport {
            install_root: cfg.install_root().to_owned(),
            install,
            cluster,
            rendered,
            readiness_attempts: running.readiness_attempts,
            roles: running.roles,
            settings_written: running.settings_written,
        })
    }

    /// Re-runs the lifecycle after the part's options changed.
    ///
    /// Binaries and cluster are reused; configuration and scripts are
    /// regenerated and newly listed roles are created.
    ///
    /// # Errors
    /// Same as [`Self::install`].
    pub fn update(&self) -> ProvisionResult<InstallReport> {
        let _span = info_span!(target: LOG_TARGET, "update", part = self.config.name()).entered();
        self.install()
    }

    /// Stops a server that may still be running before the part is removed.
    ///
    /// Never fails: a missing `pg_ctl` or a failed stop is logged and the
    /// orchestrator proceeds with removal.
    #[must_use]
    pub fn uninstall(&self) -> UninstallOutcome {
        let cfg = &self.config;
        let _span = info_span!(target: LOG_TARGET, "uninstall", part = cfg.name()).entered();
        let pg_ctl = cfg.binary("pg_ctl");
        if !pg_ctl.is_file() {
            info!(target: LOG_TARGET, "no PostgreSQL binaries, will not try to stop the server");
            return UninstallOutcome::NoBinaries;
        }

        info!(target: LOG_TARGET, "trying to stop PostgreSQL server");
        let invocation = Invocation::new(pg_ctl)
            .args(["-D", cfg.data_dir().as_str()])
            .args(["-w", "-t", "1", "-m", "immediate", "stop"])
            .capture_output();
        match self.runner.run(&invocation) {
            Ok(output) => UninstallOutcome::StopAttempted {
                exit_code: output.exit_code,
            },
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    error = %err,
                    "could not stop PostgreSQL server, uninstalling it anyway"
                );
                UninstallOutcome::StopFailed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Stages that need a running server.
    fn while_running(&self) -> ProvisionResult<RunningStages> {
        let cfg = &self.config;
        let readiness_attempts = wait_until_ready(cfg, &self.runner)?;
        let mut roles = create_superusers(cfg, &self.runner);
        roles.extend(create_users(cfg, &self.runner));
        let settings_written = finalize_config(cfg, &self.runner)?;
        Ok(RunningStages {
            readiness_attempts,
            roles,
            settings_written,
        })
    }
}

struct RunningStages {
    readiness_attempts: u32,
    roles: Vec<RoleReport>,
    settings_written: usize,
}
