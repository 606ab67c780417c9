//! Creates the configured roles with `createuser`.
//!
//! Each role is created independently. A failure, such as a role that already
//! exists on a re-run, is logged and recorded in the returned reports but never
//! aborts the lifecycle.

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::command::{CommandRunner, Invocation};
use crate::observability::LOG_TARGET;
use crate::settings::InstanceConfig;

/// Privilege level requested for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleKind {
    /// Superuser that may create databases and roles.
    Superuser,
    /// Regular user without elevated privileges.
    User,
}

impl RoleKind {
    const fn flags(self) -> [&'static str; 3] {
        match self {
            Self::Superuser => ["-s", "-d", "-r"],
            Self::User => ["-S", "-D", "-R"],
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::User => "user",
        }
    }
}

/// What happened to one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "detail")]
pub enum RoleOutcome {
    /// `createuser` succeeded.
    Created,
    /// `createuser` failed or could not be run; carries the diagnostics.
    Failed(String),
}

/// Per-role result of [`create_superusers`] and [`create_users`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleReport {
    /// Role name.
    pub name: String,
    /// Requested privilege level.
    pub kind: RoleKind,
    /// Result of the `createuser` call.
    pub outcome: RoleOutcome,
}

impl RoleReport {
    /// Whether the role was created.
    #[must_use]
    pub const fn created(&self) -> bool {
        matches!(self.outcome, RoleOutcome::Created)
    }
}

/// Creates every configured superuser, in order.
#[must_use]
pub fn create_superusers(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> Vec<RoleReport> {
    create_roles(cfg, runner, cfg.superusers(), RoleKind::Superuser)
}

/// Creates every configured regular user, in order.
#[must_use]
pub fn create_users(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> Vec<RoleReport> {
    create_roles(cfg, runner, cfg.users(), RoleKind::User)
}

fn create_roles(
    cfg: &InstanceConfig,
    runner: &dyn CommandRunner,
    names: &[String],
    kind: RoleKind,
) -> Vec<RoleReport> {
    let _span = info_span!(target: LOG_TARGET, "create_roles", kind = kind.label()).entered();
    names
        .iter()
        .map(|name| {
            info!(target: LOG_TARGET, role = %name, kind = kind.label(), "creating role");
            let outcome = match runner.run(&createuser(cfg, kind, name)) {
                Ok(output) if output.success() => RoleOutcome::Created,
                Ok(output) => RoleOutcome::Failed(output.combined().trim().to_owned()),
                Err(err) => RoleOutcome::Failed(err.to_string()),
            };
            if let RoleOutcome::Failed(detail) = &outcome {
                warn!(
                    target: LOG_TARGET,
                    role = %name,
                    kind = kind.label(),
                    detail = %detail,
                    "createuser failed"
                );
            }
            RoleReport {
                name: name.clone(),
                kind,
                outcome,
            }
        })
        .collect()
}

fn createuser(cfg: &InstanceConfig, kind: RoleKind, name: &str) -> Invocation {
    Invocation::new(cfg.binary("createuser"))
        .args(kind.flags())
        .args(["-h", cfg.socket_dir().as_str()])
        .args(["-p".to_owned(), cfg.port().to_string()])
        .args(["-U", cfg.admin(), name])
        .capture_output()
}
