//! Domain error types for the PostgreSQL provisioning recipe.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for operations that may return a [`PgProvisionError`].
pub type Result<T> = std::result::Result<T, PgProvisionError>;

/// Result alias for lifecycle-stage fallible operations.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum PgProvisionError {
    /// Indicates a lifecycle stage failed.
    #[error("provisioning failed")]
    Provision(#[from] ProvisionError),
    /// Indicates option resolution failed.
    #[error("configuration parsing failed")]
    Config(#[from] ConfigError),
}

/// Categorises provisioning failures so callers can branch on the failing stage.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ProvisionErrorKind {
    /// Represents errors without a more specific semantic meaning.
    #[default]
    Other,
    /// A required option was missing or malformed.
    Configuration,
    /// The source build or archive fetch failed.
    Installation,
    /// `initdb` exited unsuccessfully.
    ClusterInit,
    /// The server never accepted connections within the retry budget.
    ReadinessTimeout,
    /// Reading live settings from the server failed.
    Query,
    /// Writing rendered files or scripts failed.
    Io,
}

impl ProvisionErrorKind {
    /// Returns the lifecycle stage label used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Configuration => "configuration",
            Self::Installation => "installation",
            Self::ClusterInit => "cluster-init",
            Self::ReadinessTimeout => "readiness-timeout",
            Self::Query => "query",
            Self::Io => "io",
        }
    }
}

/// Captures lifecycle failures together with the underlying cause.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct ProvisionError {
    kind: ProvisionErrorKind,
    #[source]
    report: Report,
}

impl ProvisionError {
    /// Constructs a new provisioning error with the provided kind and diagnostic
    /// report.
    #[must_use]
    pub const fn new(kind: ProvisionErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> ProvisionErrorKind {
        self.kind
    }

    /// Borrows the underlying diagnostic report.
    #[must_use]
    pub const fn report(&self) -> &Report {
        &self.report
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for ProvisionError {
    fn from(report: Report) -> Self {
        Self::new(ProvisionErrorKind::Other, report)
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(err: ConfigError) -> Self {
        let ConfigError(report) = err;
        Self::new(ProvisionErrorKind::Configuration, report)
    }
}

impl From<PgProvisionError> for ProvisionError {
    fn from(err: PgProvisionError) -> Self {
        match err {
            PgProvisionError::Provision(inner) => inner,
            PgProvisionError::Config(inner) => inner.into(),
        }
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;

    #[test]
    fn config_errors_map_to_configuration_kind() {
        let err = ProvisionError::from(ConfigError::from(eyre!("port must be numeric")));
        assert_eq!(err.kind(), ProvisionErrorKind::Configuration);
        assert!(err.to_string().contains("port must be numeric"));
    }

    #[test]
    fn crate_error_unwraps_into_provision_error() {
        let inner = ProvisionError::new(ProvisionErrorKind::Query, eyre!("boom"));
        let outer = PgProvisionError::from(inner);
        let back = ProvisionError::from(outer);
        assert_eq!(back.kind(), ProvisionErrorKind::Query);
        assert_eq!(back.kind().as_str(), "query");
    }
}
