//! Writes the bootstrap configuration and helper scripts for a part.
//!
//! Every call rewrites the whole set: `postgresql.conf` and `pg_hba.conf` in
//! the data directory, and the `pgctl`, `psql`, `createuser` and `createdb`
//! scripts in the orchestrator bin directory. Output depends only on the
//! resolved [`InstanceConfig`] and the cluster's `PG_VERSION`.
//!
//! The data directory must already exist: creating it here would make the
//! next [`crate::create_cluster`] mistake an empty directory for a cluster.

use camino::Utf8PathBuf;
use color_eyre::eyre::{Context, eyre};
use serde::Serialize;
use tracing::{info, info_span};

use crate::cluster::read_pg_version;
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::write_file;
use crate::observability::LOG_TARGET;
use crate::render::{Template, Variables, hba_name, quote_literal, render, shell_quote};
use crate::settings::InstanceConfig;

const CONFIG_MODE: u32 = 0o600;
const SCRIPT_MODE: u32 = 0o755;

/// Helper scripts written to the orchestrator bin directory, with their templates.
pub(crate) const SCRIPTS: [(Template, &str); 4] = [
    (Template::PgCtl, "pgctl"),
    (Template::Psql, "psql"),
    (Template::CreateUser, "createuser"),
    (Template::CreateDb, "createdb"),
];

/// Paths written by [`write_bootstrap_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedConfigSet {
    /// Server configuration file.
    pub server_config: Utf8PathBuf,
    /// Host-based-authentication file.
    pub hba_config: Utf8PathBuf,
    /// Helper scripts, in the order they were written.
    pub scripts: Vec<Utf8PathBuf>,
}

impl RenderedConfigSet {
    /// Every written path.
    pub fn paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        [&self.server_config, &self.hba_config]
            .into_iter()
            .chain(self.scripts.iter())
    }
}

/// Renders and writes the bootstrap configuration set, overwriting existing files.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::ClusterInit`] error when the data directory
/// does not exist yet, an [`ProvisionErrorKind::Io`] error when a file cannot
/// be written, or the rendering error when a template cannot be filled.
pub fn write_bootstrap_config(cfg: &InstanceConfig) -> ProvisionResult<RenderedConfigSet> {
    let _span = info_span!(target: LOG_TARGET, "write_bootstrap_config", part = cfg.name()).entered();
    let data_dir = cfg.data_dir();
    if !data_dir.is_dir() {
        return Err(ProvisionError::new(
            ProvisionErrorKind::ClusterInit,
            eyre!("data directory {data_dir} does not exist; create the cluster first"),
        ));
    }
    info!(target: LOG_TARGET, "creating initial PostgreSQL configuration");

    let server_config = cfg.postgresql_conf();
    let server_text = render(Template::PostgresqlConf, &server_variables(cfg))?;
    write(&server_config, &server_text, CONFIG_MODE)?;

    let hba_config = cfg.pg_hba_conf();
    let pg_version = read_pg_version(cfg.data_dir()).unwrap_or_else(|| "unknown".to_owned());
    let hba_text = render(Template::PgHbaConf, &hba_variables(cfg, &pg_version))?;
    write(&hba_config, &hba_text, CONFIG_MODE)?;

    let script_vars = script_variables(cfg);
    let mut scripts = Vec::with_capacity(SCRIPTS.len());
    for (template, file_name) in SCRIPTS {
        let path = cfg.script(file_name);
        let text = render(template, &script_vars)?;
        write(&path, &text, SCRIPT_MODE)?;
        scripts.push(path);
    }

    Ok(RenderedConfigSet {
        server_config,
        hba_config,
        scripts,
    })
}

fn write(path: &Utf8PathBuf, text: &str, mode: u32) -> ProvisionResult<()> {
    write_file(path, text, mode)
        .with_context(|| format!("unable to write {path}"))
        .map_err(|report| ProvisionError::new(ProvisionErrorKind::Io, report))
}

fn server_variables(cfg: &InstanceConfig) -> Variables {
    let tuning = cfg
        .tuning()
        .iter()
        .map(|(key, value)| format!("{key} = {}", quote_literal(value)))
        .collect::<Vec<_>>()
        .join("\n");
    Variables::new()
        .with("name", cfg.name())
        .with("data_dir", quote_literal(cfg.data_dir().as_str()))
        .with("hba_file", quote_literal(cfg.pg_hba_conf().as_str()))
        .with("pid_file", quote_literal(cfg.pid_file().as_str()))
        .with("listen_addresses", quote_literal(cfg.listen_addresses()))
        .with("port", cfg.port().to_string())
        .with("socket_dir", quote_literal(cfg.socket_dir().as_str()))
        .with("tuning", tuning)
}

/// Admin and superusers reach every database; regular users only their own.
pub(crate) fn hba_entries(cfg: &InstanceConfig) -> Vec<String> {
    let mut privileged: Vec<&str> = vec![cfg.admin()];
    for name in cfg.superusers() {
        if !privileged.contains(&name.as_str()) {
            privileged.push(name);
        }
    }

    let mut entries: Vec<String> = privileged
        .into_iter()
        .map(|name| hba_line("all", name))
        .collect();
    entries.extend(cfg.users().iter().map(|name| hba_line("sameuser", name)));
    entries
}

fn hba_line(database: &str, name: &str) -> String {
    format!("local   {database:<15} {:<15} trust", hba_name(name))
}

fn hba_variables(cfg: &InstanceConfig, pg_version: &str) -> Variables {
    Variables::new()
        .with("name", cfg.name())
        .with("pg_version", pg_version.trim())
        .with("entries", hba_entries(cfg).join("\n"))
}

fn script_variables(cfg: &InstanceConfig) -> Variables {
    Variables::new()
        .with("name", cfg.name())
        .with("bin_dir", shell_quote(cfg.bin_dir().as_str()))
        .with("data_dir", shell_quote(cfg.data_dir().as_str()))
        .with("socket_dir", shell_quote(cfg.socket_dir().as_str()))
        .with(
            "log_file",
            shell_quote(cfg.data_dir().join("postgresql.log").as_str()),
        )
        .with("port", cfg.port().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{OptionMap, RecipeContext};

    fn config(pairs: &[(&str, &str)]) -> InstanceConfig {
        let context = RecipeContext::new("postgresql", "/srv/parts", "/srv/bin");
        let options: OptionMap = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        InstanceConfig::resolve(&context, &options).expect("resolve config")
    }

    #[test]
    fn admin_and_superusers_get_unrestricted_local_access() {
        let cfg = config(&[("superusers", "alice postgres"), ("users", "carol")]);
        let entries = hba_entries(&cfg);
        assert_eq!(
            entries,
            [
                "local   all             postgres        trust",
                "local   all             alice           trust",
                "local   sameuser        carol           trust",
            ]
        );
    }

    #[test]
    fn server_variables_quote_paths_and_tuning() {
        let cfg = config(&[("listen_addresses", "localhost"), ("log_line_prefix", "%m ")]);
        let text = render(Template::PostgresqlConf, &server_variables(&cfg)).expect("render");
        assert!(text.contains("data_directory = '/srv/parts/postgresql/db'"));
        assert!(text.contains("hba_file = '/srv/parts/postgresql/db/pg_hba.conf'"));
        assert!(text.contains("external_pid_file = '/srv/parts/postgresql/db/postgresql.pid'"));
        assert!(text.contains("listen_addresses = 'localhost'"));
        assert!(text.contains("port = 5432"));
        assert!(text.contains("unix_socket_directories = '/srv/parts/postgresql/db'"));
        assert!(text.contains("log_line_prefix = '%m '"));
        assert!(text.contains("shared_buffers = '24MB'"));
    }

    #[test]
    fn control_script_wraps_pg_ctl() {
        let cfg = config(&[]);
        let text = render(Template::PgCtl, &script_variables(&cfg)).expect("render");
        assert!(text.starts_with("#!/bin/sh\n"));
        assert!(text.contains(
            "exec '/srv/parts/postgresql/bin'/pg_ctl -D '/srv/parts/postgresql/db' \
             -l '/srv/parts/postgresql/db/postgresql.log' -w \"$@\""
        ));
    }
}
