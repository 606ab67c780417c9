//! Command-line front end used when the recipe runs outside an orchestrator.
//!
//! Options come from an optional TOML file, `PG_OPTION_*` environment
//! variables and repeated `--set key=value` flags, later sources winning. The
//! part context comes from flags, then `PG_RECIPE_*` variables, then defaults
//! relative to the working directory.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use figment::Figment;
use figment::providers::{Env, Format as _, Toml};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::observability::{LOG_TARGET, init_logging};
use crate::privileges::ensure_unprivileged;
use crate::{OptionMap, Recipe, RecipeContext, RecipeEnvCfg, write_bootstrap_config};

const DEFAULT_PART_NAME: &str = "postgresql";
const DEFAULT_PARTS_DIR: &str = "parts";
const DEFAULT_BIN_DIR: &str = "bin";
const OPTION_ENV_PREFIX: &str = "PG_OPTION_";

#[derive(Debug, Parser)]
#[command(name = "pg_provision", version, about = "Provision a local PostgreSQL instance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// TOML file holding the part's options.
    #[arg(long, global = true, value_name = "FILE")]
    options: Option<Utf8PathBuf>,
    /// Sets one option, overriding the file and the environment.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    assignments: Vec<String>,
    /// Part name.
    #[arg(long, global = true)]
    name: Option<String>,
    /// Directory holding every part's install root.
    #[arg(long, global = true)]
    parts_dir: Option<Utf8PathBuf>,
    /// Directory receiving the helper scripts.
    #[arg(long, global = true)]
    bin_dir: Option<Utf8PathBuf>,
    /// Prints a JSON report instead of plain text.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Runs the full provisioning lifecycle and prints the install root.
    Install,
    /// Re-runs the lifecycle after the options changed.
    Update,
    /// Stops a server that may still be running.
    Uninstall,
    /// Rewrites the bootstrap configuration and scripts of an existing cluster
    /// without starting anything.
    Render,
}

/// Option value as read from TOML or the environment.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl RawValue {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Integer(number) => number.to_string(),
            Self::Float(number) => number.to_string(),
            Self::Bool(flag) => flag.to_string(),
        }
    }
}

/// Parses the process arguments and runs the requested subcommand.
///
/// # Errors
/// Returns an error when the options cannot be loaded or the lifecycle fails.
pub fn run() -> Result<()> {
    if let Err(err) = color_eyre::install() {
        debug!(target: LOG_TARGET, "color_eyre already installed: {err}");
    }
    if !init_logging() {
        debug!(target: LOG_TARGET, "tracing subscriber already installed");
    }
    let stdout = std::io::stdout();
    run_with(std::env::args_os(), &mut stdout.lock())
}

/// Runs the CLI with explicit arguments, writing results to `out`.
///
/// # Errors
/// Returns an error when the arguments are invalid, the options cannot be
/// loaded, or the lifecycle fails.
pub fn run_with<I, W>(args: I, out: &mut W) -> Result<()>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    let cli = Cli::try_parse_from(args)?;
    let env_cfg = RecipeEnvCfg::load().context("failed to load PG_RECIPE_* configuration")?;
    let context = resolve_context(&cli, &env_cfg);
    let options_file = cli.options.as_deref().or(env_cfg.options_file.as_deref());
    let options = load_options(options_file, &cli.assignments)?;

    match cli.command {
        Command::Install | Command::Update => {
            ensure_unprivileged()?;
            let recipe = Recipe::new(&context, &options)?;
            let report = if matches!(cli.command, Command::Update) {
                recipe.update()?
            } else {
                recipe.install()?
            };
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                writeln!(out, "{}", report.install_root)?;
            }
        }
        Command::Uninstall => {
            let outcome = Recipe::new(&context, &options)?.uninstall();
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
            }
        }
        Command::Render => {
            let recipe = Recipe::new(&context, &options)?;
            let rendered = write_bootstrap_config(recipe.config())?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&rendered)?)?;
            } else {
                for path in rendered.paths() {
                    writeln!(out, "{path}")?;
                }
            }
        }
    }
    Ok(())
}

fn resolve_context(cli: &Cli, env_cfg: &RecipeEnvCfg) -> RecipeContext {
    let defaults = RecipeContext::new(DEFAULT_PART_NAME, DEFAULT_PARTS_DIR, DEFAULT_BIN_DIR);
    let from_env = env_cfg.context_or(&defaults);
    RecipeContext::new(
        cli.name.clone().unwrap_or(from_env.name),
        cli.parts_dir.clone().unwrap_or(from_env.parts_directory),
        cli.bin_dir.clone().unwrap_or(from_env.bin_directory),
    )
}

/// Merges the options file, `PG_OPTION_*` variables and `key=value` assignments.
///
/// Environment keys are lowercased, so `PG_OPTION_WORK_MEM` sets `work_mem`.
/// Numbers and booleans are converted to their textual form.
///
/// # Errors
/// Returns a [`ConfigError`] when the file cannot be parsed, a value is not a
/// scalar, or an assignment lacks `=`.
pub fn load_options(file: Option<&Utf8Path>, assignments: &[String]) -> ConfigResult<OptionMap> {
    let mut figment = Figment::new();
    if let Some(path) = file {
        if !path.is_file() {
            return Err(ConfigError::from(eyre!("options file {path} does not exist")));
        }
        figment = figment.merge(Toml::file(path.as_std_path()));
    }
    figment = figment.merge(Env::prefixed(OPTION_ENV_PREFIX));

    let raw: BTreeMap<String, RawValue> = figment
        .extract()
        .map_err(|err| ConfigError::from(eyre!("failed to load options: {err}")))?;
    let mut options: OptionMap = raw
        .into_iter()
        .map(|(key, value)| (key, value.into_text()))
        .collect();

    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        options.insert(key.to_owned(), value.to_owned());
    }
    Ok(options)
}

fn parse_assignment(assignment: &str) -> ConfigResult<(&str, &str)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(ConfigError::from(eyre!(
            "expected KEY=VALUE, received {assignment:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("port=6543", ("port", "6543"))]
    #[case("postgresql.conf=work_mem = 8MB", ("postgresql.conf", "work_mem = 8MB"))]
    #[case(" users =app", ("users", "app"))]
    #[case("listen_addresses=", ("listen_addresses", ""))]
    fn assignments_split_on_the_first_equals(#[case] raw: &str, #[case] expected: (&str, &str)) {
        assert_eq!(parse_assignment(raw).expect("valid assignment"), expected);
    }

    #[rstest]
    #[case("port")]
    #[case("=6543")]
    fn malformed_assignments_are_rejected(#[case] raw: &str) {
        let err = parse_assignment(raw).expect_err("malformed assignment");
        assert!(err.to_string().contains("KEY=VALUE"));
    }

    #[test]
    fn subcommands_accept_global_flags_after_the_name() {
        let cli = Cli::try_parse_from([
            "pg_provision",
            "install",
            "--set",
            "port=6543",
            "--name",
            "db",
            "--json",
        ])
        .expect("parse cli");
        assert!(matches!(cli.command, Command::Install));
        assert_eq!(cli.assignments, ["port=6543"]);
        assert_eq!(cli.name.as_deref(), Some("db"));
        assert!(cli.json);
    }
}
