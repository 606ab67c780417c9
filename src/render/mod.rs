//! Template rendering for the configuration files and helper scripts.
//!
//! Templates are Jinja text with `{{ name }}` placeholders, rendered by a
//! sandboxed `minijinja` environment. Rendering is pure: the same template and
//! variables always yield the same text, and a placeholder without a value is
//! an error rather than an empty string.

use std::collections::BTreeMap;

use color_eyre::eyre::{Report, WrapErr};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::error::{ProvisionError, ProvisionErrorKind, ProvisionResult};

/// Templates bundled with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Bootstrap `postgresql.conf`.
    PostgresqlConf,
    /// `pg_hba.conf`.
    PgHbaConf,
    /// `pgctl` control script.
    PgCtl,
    /// `psql` wrapper.
    Psql,
    /// `createuser` wrapper.
    CreateUser,
    /// `createdb` wrapper.
    CreateDb,
}

impl Template {
    /// Every bundled template.
    pub const ALL: [Self; 6] = [
        Self::PostgresqlConf,
        Self::PgHbaConf,
        Self::PgCtl,
        Self::Psql,
        Self::CreateUser,
        Self::CreateDb,
    ];

    /// Template file name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PostgresqlConf => "postgresql.conf.tmpl",
            Self::PgHbaConf => "pg_hba.conf.tmpl",
            Self::PgCtl => "pgctl.sh.tmpl",
            Self::Psql => "psql.sh.tmpl",
            Self::CreateUser => "createuser.sh.tmpl",
            Self::CreateDb => "createdb.sh.tmpl",
        }
    }

    /// Looks a template up by file name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|template| template.name() == name)
    }

    const fn source(self) -> &'static str {
        match self {
            Self::PostgresqlConf => include_str!("templates/postgresql.conf.tmpl"),
            Self::PgHbaConf => include_str!("templates/pg_hba.conf.tmpl"),
            Self::PgCtl => include_str!("templates/pgctl.sh.tmpl"),
            Self::Psql => include_str!("templates/psql.sh.tmpl"),
            Self::CreateUser => include_str!("templates/createuser.sh.tmpl"),
            Self::CreateDb => include_str!("templates/createdb.sh.tmpl"),
        }
    }
}

/// Placeholder values for one rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    /// Creates an empty set of variables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any earlier value.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_owned(), value.into());
        self
    }

    /// Returns the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Renders `template` with `variables`.
///
/// # Examples
/// ```
/// use pg_provision::render::{Template, Variables, render};
///
/// let vars = Variables::new()
///     .with("name", "postgresql")
///     .with("bin_dir", "'/opt/pg/bin'")
///     .with("socket_dir", "'/srv/db'")
///     .with("port", "5432");
/// let script = render(Template::Psql, &vars)?;
/// assert!(script.contains("exec '/opt/pg/bin'/psql -h '/srv/db' -p 5432"));
/// # Ok::<(), pg_provision::ProvisionError>(())
/// ```
///
/// # Errors
/// Returns an error when the template references a variable that is not set or
/// is not valid template syntax.
pub fn render(template: Template, variables: &Variables) -> ProvisionResult<String> {
    render_text(template.name(), template.source(), variables)
}

fn render_text(name: &str, source: &str, variables: &Variables) -> ProvisionResult<String> {
    environment()
        .render_str(source, &variables.values)
        .map_err(Report::new)
        .wrap_err_with(|| format!("failed to render {name}"))
        .map_err(|report| ProvisionError::new(ProvisionErrorKind::Other, report))
}

/// Strict environment: no escaping, trailing newlines kept, undefined values rejected.
fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

/// Quotes `value` as a `postgresql.conf` string literal.
///
/// # Examples
/// ```
/// use pg_provision::render::quote_literal;
///
/// assert_eq!(quote_literal("%t "), "'%t '");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quotes `value` for a POSIX shell word.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quotes a role name for `pg_hba.conf` when it is not a plain identifier.
#[must_use]
pub fn hba_name(name: &str) -> String {
    if name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.')
    {
        name.to_owned()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_tolerate_inner_whitespace() {
        let vars = Variables::new().with("who", "world");
        let text = render_text("inline", "hello {{ who }} and {{who}}!", &vars).expect("render");
        assert_eq!(text, "hello world and world!");
    }

    #[test]
    fn unset_variables_are_errors() {
        let err = render_text("inline", "port = {{port}}", &Variables::new())
            .expect_err("unset variable must fail");
        assert!(err.to_string().contains("failed to render inline"));
        assert!(format!("{:?}", err.report()).contains("undefined"));
    }

    #[test]
    fn unterminated_placeholders_are_errors() {
        let err = render_text("inline", "port = {{port", &Variables::new().with("port", "1"))
            .expect_err("unterminated placeholder must fail");
        assert!(err.to_string().contains("failed to render inline"));
    }

    #[test]
    fn trailing_newline_is_preserved() {
        let vars = Variables::new().with("port", "5432");
        let text = render_text("inline", "port = {{ port }}\n", &vars).expect("render");
        assert_eq!(text, "port = 5432\n");
    }

    #[test]
    fn templates_resolve_by_name() {
        for template in Template::ALL {
            assert_eq!(Template::from_name(template.name()), Some(template));
        }
        assert_eq!(Template::from_name("missing.tmpl"), None);
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/opt/o'brien"), r"'/opt/o'\''brien'");
    }

    #[test]
    fn hba_name_quotes_unusual_roles() {
        assert_eq!(hba_name("app_user"), "app_user");
        assert_eq!(hba_name("Ops Team"), "\"Ops Team\"");
    }

    #[test]
    fn quote_literal_doubles_backslashes() {
        assert_eq!(quote_literal(r"C:\pg"), r"'C:\\pg'");
    }
}
