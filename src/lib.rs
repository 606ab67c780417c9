//! Provisions a local PostgreSQL instance as one step of a build pipeline.
//!
//! The orchestrator hands over a part name, its directories and a flat option
//! map. [`Recipe::install`] then acquires the binaries, initialises the
//! cluster, writes the bootstrap configuration and helper scripts, starts the
//! server, creates the configured roles, rewrites `postgresql.conf` from the
//! server's own defaults plus the caller's overrides, and stops the server.
//! Every stage is idempotent so the recipe can be re-run after a failure.
//!
//! Subprocesses are described as argument vectors and executed through the
//! [`CommandRunner`] trait, which tests replace with a recording fake.

pub mod cli;
pub mod cluster;
pub mod command;
pub mod control;
pub mod emit;
mod error;
pub mod finalize;
mod fs;
pub mod install;
mod observability;
pub mod privileges;
pub mod provision;
pub mod readiness;
mod recipe;
pub mod render;
mod settings;
#[doc(hidden)]
pub mod test_support;

pub use cluster::{ClusterOutcome, create_cluster};
pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use control::{ServerProcess, start, stop};
pub use emit::{RenderedConfigSet, write_bootstrap_config};
pub use error::{
    ConfigError, ConfigResult, PgProvisionError, ProvisionError, ProvisionErrorKind,
    ProvisionResult, Result,
};
pub use finalize::finalize_config;
pub use install::{InstallResult, InstallationState, ensure_installed};
pub use observability::init_logging;
pub use provision::{RoleKind, RoleOutcome, RoleReport, create_superusers, create_users};
pub use readiness::{ReadinessPoller, ReadinessState, wait_until_ready};
pub use recipe::{InstallReport, Recipe, UninstallOutcome};
pub use settings::{InstanceConfig, OptionMap, RecipeContext, SourceBuild};

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;

/// Orchestrator context supplied through `PG_RECIPE_*` environment variables.
///
/// # Examples
/// ```
/// use pg_provision::RecipeEnvCfg;
///
/// let cfg = RecipeEnvCfg::default();
/// assert!(cfg.name.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "PG_RECIPE")]
pub struct RecipeEnvCfg {
    /// Part name; the install root is named after it.
    pub name: Option<String>,
    /// Directory holding every part's install root.
    pub parts_dir: Option<Utf8PathBuf>,
    /// Orchestrator bin directory that receives the helper scripts.
    pub bin_dir: Option<Utf8PathBuf>,
    /// TOML file holding the part's options.
    pub options_file: Option<Utf8PathBuf>,
}

impl RecipeEnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a variable holds a value of the wrong type.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("pg-provision")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }

    /// Builds a [`RecipeContext`], filling unset fields from `fallback`.
    #[must_use]
    pub fn context_or(&self, fallback: &RecipeContext) -> RecipeContext {
        RecipeContext::new(
            self.name.clone().unwrap_or_else(|| fallback.name.clone()),
            self.parts_dir
                .clone()
                .unwrap_or_else(|| fallback.parts_directory.clone()),
            self.bin_dir
                .clone()
                .unwrap_or_else(|| fallback.bin_directory.clone()),
        )
    }
}
