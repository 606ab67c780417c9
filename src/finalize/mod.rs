//! Rewrites `postgresql.conf` from the running server's own settings.
//!
//! The bootstrap configuration only carries what the server needs to start.
//! Once it is up, every non-internal setting is read back from `pg_settings`
//! and written out grouped by category with its description, followed by the
//! caller's override text so later assignments take precedence.

mod wrap;

use color_eyre::eyre::{Context, eyre};
use tracing::{info, info_span};

use crate::command::{CommandRunner, Invocation, render_failure};
use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};
use crate::fs::write_file;
use crate::observability::LOG_TARGET;
use crate::render::quote_literal;
use crate::settings::InstanceConfig;

use self::wrap::wrap;

/// Query listing every setting a configuration file may carry.
pub const SETTINGS_QUERY: &str = "SELECT name, setting, category, short_desc FROM pg_settings \
     WHERE context <> 'internal' ORDER BY name";

/// Separates the fields of one row in the `psql` output of [`SETTINGS_QUERY`].
pub const FIELD_SEPARATOR: char = '\u{1f}';
/// Terminates each row in the `psql` output of [`SETTINGS_QUERY`].
pub const RECORD_SEPARATOR: char = '\u{1e}';

const HEADER: &str = "# Default configuration from PostgreSQL\n";
const OVERRIDE_MARKER: &str = "# Override default values here\n";
const DESCRIPTION_WIDTH: usize = 78;
const CONFIG_MODE: u32 = 0o600;

/// Settings PostgreSQL rejects in a configuration file.
const SKIPPED: &[&str] = &["config_file", "session_authorization", "role", "seed"];
const SKIPPED_PREFIXES: &[&str] = &["transaction_"];

/// One row of `pg_settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRow {
    /// Setting name.
    pub name: String,
    /// Current value as reported by the server.
    pub setting: String,
    /// Category used to group the output.
    pub category: String,
    /// One-line description.
    pub description: String,
}

impl SettingRow {
    fn is_skipped(&self) -> bool {
        SKIPPED.contains(&self.name.as_str())
            || SKIPPED_PREFIXES
                .iter()
                .any(|prefix| self.name.starts_with(prefix))
    }

    /// Value to write, correcting the empty `lc_messages` some servers report.
    fn value(&self) -> &str {
        if self.name == "lc_messages" && self.setting.is_empty() {
            "C"
        } else {
            &self.setting
        }
    }
}

/// Parses unaligned, tuples-only `psql` output of [`SETTINGS_QUERY`].
///
/// Rows end with [`RECORD_SEPARATOR`] and fields are split on
/// [`FIELD_SEPARATOR`], neither of which occurs in setting values or
/// descriptions. Blank rows and the newline `psql` appends are ignored.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::Query`] error for a row that does not have
/// exactly four fields.
pub fn parse_settings(stdout: &str) -> ProvisionResult<Vec<SettingRow>> {
    stdout
        .split(RECORD_SEPARATOR)
        .map(|record| record.trim_matches(|ch: char| ch == '\n' || ch == '\r'))
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
            match fields.as_slice() {
                [name, setting, category, description] => Ok(SettingRow {
                    name: (*name).to_owned(),
                    setting: (*setting).to_owned(),
                    category: (*category).to_owned(),
                    description: (*description).to_owned(),
                }),
                _ => Err(ProvisionError::new(
                    ProvisionErrorKind::Query,
                    eyre!(
                        "malformed pg_settings row with {} fields: {record:?}",
                        fields.len()
                    ),
                )),
            }
        })
        .collect()
}

/// Renders the finalised configuration text.
///
/// # Examples
/// ```
/// use pg_provision::finalize::{SettingRow, render_config};
///
/// let rows = [SettingRow {
///     name: "work_mem".into(),
///     setting: "4MB".into(),
///     category: "Resource Usage / Memory".into(),
///     description: "Sets the maximum memory to be used for query workspaces.".into(),
/// }];
/// let text = render_config(&rows, "work_mem = 8MB\n");
/// assert!(text.contains("work_mem = '4MB'\n"));
/// assert!(text.ends_with("# Override default values here\nwork_mem = 8MB\n"));
/// ```
#[must_use]
pub fn render_config(rows: &[SettingRow], overrides: &str) -> String {
    let mut out = String::from(HEADER);
    let mut current_category: Option<&str> = None;
    for row in rows.iter().filter(|row| !row.is_skipped()) {
        if current_category != Some(row.category.as_str()) {
            let banner = format!("## {} ##", row.category);
            let frame = "#".repeat(banner.chars().count());
            out.push_str(&format!("\n{frame}\n{banner}\n{frame}\n"));
            current_category = Some(&row.category);
        }

        let lines = wrap(&row.description, DESCRIPTION_WIDTH);
        if lines.is_empty() {
            out.push_str("# \n");
        }
        for line in lines {
            out.push_str(&format!("# {line}\n"));
        }
        out.push_str(&format!("{} = {}\n\n", row.name, quote_literal(row.value())));
    }
    out.push_str("\n\n");
    out.push_str(OVERRIDE_MARKER);
    out.push_str(overrides);
    out
}

/// Reads the live settings and rewrites `postgresql.conf`.
///
/// Returns the number of settings written.
///
/// # Errors
/// Returns a [`ProvisionErrorKind::Query`] error when `psql` exits
/// unsuccessfully or writes anything to stderr, and
/// [`ProvisionErrorKind::Io`] when the file cannot be written.
pub fn finalize_config(cfg: &InstanceConfig, runner: &dyn CommandRunner) -> ProvisionResult<usize> {
    let _span = info_span!(target: LOG_TARGET, "finalize_config", part = cfg.name()).entered();
    info!(target: LOG_TARGET, "updating PostgreSQL configuration");

    let output = runner
        .run(&settings_query(cfg))
        .map_err(|err| ProvisionError::new(ProvisionErrorKind::Query, err.into_report()))?;
    if !output.success() || !output.stderr.trim().is_empty() {
        return Err(ProvisionError::new(
            ProvisionErrorKind::Query,
            render_failure("unable to get settings from PostgreSQL", &output),
        ));
    }

    let rows = parse_settings(&output.stdout)?;
    let written = rows.iter().filter(|row| !row.is_skipped()).count();
    info!(
        target: LOG_TARGET,
        settings = written,
        "rewriting the PostgreSQL configuration file with default values"
    );
    let text = render_config(&rows, cfg.conf_overrides());
    let path = cfg.postgresql_conf();
    write_file(&path, &text, CONFIG_MODE)
        .with_context(|| format!("unable to write {path}"))
        .map_err(|report| ProvisionError::new(ProvisionErrorKind::Io, report))?;
    Ok(written)
}

fn settings_query(cfg: &InstanceConfig) -> Invocation {
    Invocation::new(cfg.binary("psql"))
        .args(["-h", cfg.socket_dir().as_str()])
        .args(["-p".to_owned(), cfg.port().to_string()])
        .args(["-U", cfg.admin()])
        .args(["--no-align", "--quiet", "--tuples-only", "-X"])
        .args(["-F".to_owned(), FIELD_SEPARATOR.to_string()])
        .args(["-R".to_owned(), RECORD_SEPARATOR.to_string()])
        .args(["-d", "postgres", "-c", SETTINGS_QUERY])
        .capture_output()
}

#[cfg(test)]
mod tests;
