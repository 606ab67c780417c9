//! Resolves the orchestrator's option map into an immutable [`InstanceConfig`].
//!
//! Resolution is pure: it applies documented defaults, derives the install,
//! binary, data, socket and pid paths, and normalises the role lists. Nothing
//! touches the filesystem until a lifecycle stage consumes the result.

mod options;

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

use self::options as opt;

/// Raw option name to value mapping supplied by the orchestrator.
pub type OptionMap = BTreeMap<String, String>;

/// Orchestrator-owned context for one recipe part.
///
/// # Examples
/// ```
/// use camino::Utf8PathBuf;
/// use pg_provision::RecipeContext;
///
/// let context = RecipeContext::new("postgresql", "/srv/build/parts", "/srv/build/bin");
/// assert_eq!(context.location(), Utf8PathBuf::from("/srv/build/parts/postgresql"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeContext {
    /// Name of the part; the install root is named after it.
    pub name: String,
    /// Directory holding every part's install root.
    pub parts_directory: Utf8PathBuf,
    /// Orchestrator bin directory that receives the helper scripts.
    pub bin_directory: Utf8PathBuf,
}

impl RecipeContext {
    /// Builds a context from its three components.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parts_directory: impl Into<Utf8PathBuf>,
        bin_directory: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            parts_directory: parts_directory.into(),
            bin_directory: bin_directory.into(),
        }
    }

    /// Install root for this part: `<parts directory>/<name>`.
    #[must_use]
    pub fn location(&self) -> Utf8PathBuf {
        self.parts_directory.join(&self.name)
    }
}

/// Options for the build-from-source installer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceBuild {
    /// Source tarball URL.
    pub url: Option<String>,
    /// Extra arguments appended to `configure`.
    pub configure_options: Vec<String>,
}

/// Fully resolved configuration for one lifecycle run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceConfig {
    name: String,
    install_root: Utf8PathBuf,
    bin_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
    pid_file: Utf8PathBuf,
    socket_dir: Utf8PathBuf,
    scripts_dir: Utf8PathBuf,
    listen_addresses: String,
    port: u16,
    admin: String,
    superusers: Vec<String>,
    users: Vec<String>,
    conf_overrides: String,
    archive_url: Option<String>,
    source: SourceBuild,
    tuning: Vec<(String, String)>,
    passthrough: BTreeMap<String, String>,
    startup_attempts: NonZeroU32,
    startup_delay: Duration,
}

impl InstanceConfig {
    /// Applies defaults to `options` and derives every path for `context`.
    ///
    /// # Examples
    /// ```
    /// use pg_provision::{InstanceConfig, OptionMap, RecipeContext};
    ///
    /// let context = RecipeContext::new("postgresql", "/srv/parts", "/srv/bin");
    /// let cfg = InstanceConfig::resolve(&context, &OptionMap::new())?;
    /// assert_eq!(cfg.admin(), "postgres");
    /// assert_eq!(cfg.port(), 5432);
    /// assert_eq!(cfg.data_dir().as_str(), "/srv/parts/postgresql/db");
    /// # Ok::<(), pg_provision::ConfigError>(())
    /// ```
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the part name or admin role is empty, the
    /// port is not a valid TCP port, the startup budget is malformed, or a path
    /// option cannot be used as a path.
    pub fn resolve(context: &RecipeContext, options: &OptionMap) -> ConfigResult<Self> {
        let name = context.name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(config_error(format!(
                "part name must be a non-empty single path component (received {:?})",
                context.name
            )));
        }

        let lookup = Lookup { options };
        let install_root = context.parts_directory.join(name);
        let bin_dir = lookup.path(opt::BIN_DIR, &context.parts_directory)?
            .unwrap_or_else(|| install_root.join(opt::BIN_SUBDIR));
        let data_dir = lookup.path(opt::CONFIG_DIR, &context.parts_directory)?
            .unwrap_or_else(|| install_root.join(opt::DATA_SUBDIR));
        let pid_file = lookup.path(opt::PID_FILE, &context.parts_directory)?
            .unwrap_or_else(|| data_dir.join(opt::PID_FILE_NAME));
        let socket_dir = lookup.path(opt::SOCKET_DIR, &context.parts_directory)?
            .unwrap_or_else(|| data_dir.clone());
        let scripts_dir = context.bin_directory.clone();
        ensure_usable_path("bin directory", &scripts_dir)?;

        let admin = resolve_admin(lookup.text(opt::ADMIN))?;
        let superusers = split_names(lookup.raw(opt::SUPERUSERS).unwrap_or(opt::DEFAULT_SUPERUSERS));
        let users = split_names(lookup.text(opt::USERS).unwrap_or_default())
            .into_iter()
            .filter(|user| *user != admin && !superusers.contains(user))
            .collect();

        Ok(Self {
            name: name.to_owned(),
            install_root,
            bin_dir,
            data_dir,
            pid_file,
            socket_dir,
            scripts_dir,
            listen_addresses: lookup.raw(opt::LISTEN_ADDRESSES).unwrap_or_default().to_owned(),
            port: resolve_port(lookup.text(opt::PORT))?,
            admin,
            superusers,
            users,
            conf_overrides: lookup.raw(opt::CONF_OVERRIDES).unwrap_or_default().to_owned(),
            archive_url: lookup.text(opt::URL_BIN).map(str::to_owned),
            source: SourceBuild {
                url: lookup.text(opt::SOURCE_URL).map(str::to_owned),
                configure_options: lookup
                    .text(opt::CONFIGURE_OPTIONS)
                    .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
                    .unwrap_or_default(),
            },
            tuning: resolve_tuning(options),
            passthrough: options
                .iter()
                .filter(|(key, _)| !opt::is_recognised(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            startup_attempts: resolve_attempts(lookup.text(opt::STARTUP_ATTEMPTS))?,
            startup_delay: resolve_delay(lookup.text(opt::STARTUP_DELAY_MS))?,
        })
    }

    /// Part name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install root returned to the orchestrator.
    #[must_use]
    pub fn install_root(&self) -> &Utf8Path {
        &self.install_root
    }

    /// Directory holding the PostgreSQL executables (`initdb`, `psql`, ...).
    #[must_use]
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin_dir
    }

    /// Cluster data directory; also holds `postgresql.conf` and `pg_hba.conf`.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// External pid file written by the server.
    #[must_use]
    pub fn pid_file(&self) -> &Utf8Path {
        &self.pid_file
    }

    /// Directory holding the server's Unix socket.
    #[must_use]
    pub fn socket_dir(&self) -> &Utf8Path {
        &self.socket_dir
    }

    /// Orchestrator bin directory that receives the helper scripts.
    #[must_use]
    pub fn scripts_dir(&self) -> &Utf8Path {
        &self.scripts_dir
    }

    /// Value for `listen_addresses`; empty means Unix socket only.
    #[must_use]
    pub fn listen_addresses(&self) -> &str {
        &self.listen_addresses
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Administrative role created by `initdb`.
    #[must_use]
    pub fn admin(&self) -> &str {
        &self.admin
    }

    /// Superuser roles, in configuration order without duplicates.
    #[must_use]
    pub fn superusers(&self) -> &[String] {
        &self.superusers
    }

    /// Regular roles, in configuration order, excluding the admin and any superuser.
    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Raw text appended to the finalised `postgresql.conf`.
    #[must_use]
    pub fn conf_overrides(&self) -> &str {
        &self.conf_overrides
    }

    /// Prebuilt archive URL; `None` selects the source build.
    #[must_use]
    pub fn archive_url(&self) -> Option<&str> {
        self.archive_url.as_deref()
    }

    /// Source build options.
    #[must_use]
    pub const fn source(&self) -> &SourceBuild {
        &self.source
    }

    /// Tuning knobs in output order.
    #[must_use]
    pub fn tuning(&self) -> &[(String, String)] {
        &self.tuning
    }

    /// Options the resolver did not recognise, unchanged.
    #[must_use]
    pub const fn passthrough(&self) -> &BTreeMap<String, String> {
        &self.passthrough
    }

    /// Maximum number of readiness probes.
    #[must_use]
    pub const fn startup_attempts(&self) -> NonZeroU32 {
        self.startup_attempts
    }

    /// Delay between readiness probes.
    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    /// Path of the rendered server configuration file.
    #[must_use]
    pub fn postgresql_conf(&self) -> Utf8PathBuf {
        self.data_dir.join("postgresql.conf")
    }

    /// Path of the rendered host-based-authentication file.
    #[must_use]
    pub fn pg_hba_conf(&self) -> Utf8PathBuf {
        self.data_dir.join("pg_hba.conf")
    }

    /// Path of a PostgreSQL executable inside [`Self::bin_dir`].
    #[must_use]
    pub fn binary(&self, name: &str) -> Utf8PathBuf {
        self.bin_dir.join(name)
    }

    /// Path of a helper script inside [`Self::scripts_dir`].
    #[must_use]
    pub fn script(&self, name: &str) -> Utf8PathBuf {
        self.scripts_dir.join(name)
    }
}

struct Lookup<'a> {
    options: &'a OptionMap,
}

impl<'a> Lookup<'a> {
    fn raw(&self, key: &str) -> Option<&'a str> {
        self.options.get(key).map(String::as_str)
    }

    /// Trimmed value; blank values count as absent.
    fn text(&self, key: &str) -> Option<&'a str> {
        self.raw(key).map(str::trim).filter(|value| !value.is_empty())
    }

    fn path(&self, key: &str, base: &Utf8Path) -> ConfigResult<Option<Utf8PathBuf>> {
        let Some(value) = self.text(key) else {
            return Ok(None);
        };
        let candidate = Utf8PathBuf::from(value);
        ensure_usable_path(key, &candidate)?;
        if candidate.is_absolute() {
            Ok(Some(candidate))
        } else {
            Ok(Some(base.join(candidate)))
        }
    }
}

fn ensure_usable_path(label: &str, path: &Utf8Path) -> ConfigResult<()> {
    if path.as_str().is_empty() || path.as_str().contains('\0') {
        return Err(config_error(format!(
            "{label} must be a usable path (received {path:?})"
        )));
    }
    Ok(())
}

fn resolve_admin(raw: Option<&str>) -> ConfigResult<String> {
    let admin = raw.unwrap_or(opt::DEFAULT_ADMIN);
    if admin.split_whitespace().count() != 1 {
        return Err(config_error(format!(
            "{} must be a single role name (received {admin:?})",
            opt::ADMIN
        )));
    }
    Ok(admin.to_owned())
}

fn resolve_port(raw: Option<&str>) -> ConfigResult<u16> {
    let Some(value) = raw else {
        return Ok(opt::DEFAULT_PORT);
    };
    match value.parse::<u16>() {
        Ok(0) | Err(_) => Err(config_error(format!(
            "{} must be a TCP port between 1 and 65535 (received {value:?})",
            opt::PORT
        ))),
        Ok(port) => Ok(port),
    }
}

fn resolve_attempts(raw: Option<&str>) -> ConfigResult<NonZeroU32> {
    let Some(value) = raw else {
        return Ok(opt::DEFAULT_STARTUP_ATTEMPTS);
    };
    value.parse::<NonZeroU32>().map_err(|_| {
        config_error(format!(
            "{} must be a positive integer (received {value:?})",
            opt::STARTUP_ATTEMPTS
        ))
    })
}

fn resolve_delay(raw: Option<&str>) -> ConfigResult<Duration> {
    let Some(value) = raw else {
        return Ok(Duration::from_millis(opt::DEFAULT_STARTUP_DELAY_MS));
    };
    value.parse::<u64>().map(Duration::from_millis).map_err(|err| {
        config_error(format!(
            "{} must be a number of milliseconds (received {value:?}): {err}",
            opt::STARTUP_DELAY_MS
        ))
    })
}

fn resolve_tuning(options: &OptionMap) -> Vec<(String, String)> {
    opt::TUNING_DEFAULTS
        .iter()
        .map(|(key, default)| {
            let value = options
                .get(*key)
                .map_or(*default, String::as_str);
            ((*key).to_owned(), value.to_owned())
        })
        .collect()
}

/// Splits a whitespace-separated role list, keeping first occurrences only.
fn split_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split_whitespace() {
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_owned());
        }
    }
    names
}

fn config_error(message: String) -> ConfigError {
    ConfigError::from(eyre!(message))
}
