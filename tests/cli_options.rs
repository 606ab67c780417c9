//! Option loading and the command-line front end.

use std::ffi::OsString;

use camino::Utf8Path;
use color_eyre::eyre::{Result, ensure};
use pg_provision::cli::{load_options, run_with};
use pg_provision::test_support::utf8_tempdir;
use rstest::rstest;
use serial_test::serial;

fn args(raw: &[&str]) -> Vec<OsString> {
    std::iter::once("pg_provision")
        .chain(raw.iter().copied())
        .map(OsString::from)
        .collect()
}

fn write_options(dir: &Utf8Path, body: &str) -> Result<camino::Utf8PathBuf> {
    let path = dir.join("options.toml");
    std::fs::write(&path, body)?;
    Ok(path)
}

#[test]
#[serial]
fn toml_scalars_become_text() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let file = write_options(
        &root,
        "port = 6543\nfsync = false\nusers = \"app web\"\n\"postgresql.conf\" = \"work_mem = 8MB\"\n",
    )?;

    let options = temp_env::with_vars_unset(["PG_OPTION_PORT", "PG_OPTION_USERS"], || {
        load_options(Some(&file), &[])
    })?;

    ensure!(options.get("port").map(String::as_str) == Some("6543"));
    ensure!(options.get("fsync").map(String::as_str) == Some("false"));
    ensure!(options.get("users").map(String::as_str) == Some("app web"));
    ensure!(options.get("postgresql.conf").map(String::as_str) == Some("work_mem = 8MB"));
    Ok(())
}

#[rstest]
#[case::environment_beats_file(Some("7000"), &[], "7000")]
#[case::assignment_beats_environment(Some("7000"), &["port=7100"], "7100")]
#[case::file_alone(None, &[], "6543")]
#[serial]
fn later_sources_win(
    #[case] env_port: Option<&str>,
    #[case] assignments: &[&str],
    #[case] expected: &str,
) -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let file = write_options(&root, "port = 6543\n")?;
    let assignments: Vec<String> = assignments.iter().map(|raw| (*raw).to_owned()).collect();

    let options = temp_env::with_var("PG_OPTION_PORT", env_port, || {
        load_options(Some(&file), &assignments)
    })?;

    ensure!(options.get("port").map(String::as_str) == Some(expected));
    Ok(())
}

#[test]
#[serial]
fn environment_keys_are_lowercased() -> Result<()> {
    let options = temp_env::with_var("PG_OPTION_WORK_MEM", Some("16MB"), || load_options(None, &[]))?;
    ensure!(options.get("work_mem").map(String::as_str) == Some("16MB"));
    Ok(())
}

#[test]
#[serial]
fn missing_options_file_is_an_error() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let missing = root.join("absent.toml");

    let err = load_options(Some(&missing), &[])
        .err()
        .ok_or_else(|| color_eyre::eyre::eyre!("missing file should be rejected"))?;

    ensure!(err.to_string().contains("does not exist"), "{err}");
    Ok(())
}

#[test]
#[serial]
fn render_writes_the_bootstrap_set_and_lists_it() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let parts = root.join("parts");
    let bin = root.join("bin");
    std::fs::create_dir_all(parts.join("postgresql/db"))?;
    let mut out = Vec::new();

    temp_env::with_vars_unset(["PG_RECIPE_NAME", "PG_RECIPE_OPTIONS_FILE"], || {
        run_with(
            args(&[
                "render",
                "--parts-dir",
                parts.as_str(),
                "--bin-dir",
                bin.as_str(),
                "--set",
                "port=6543",
            ]),
            &mut out,
        )
    })?;

    let printed = String::from_utf8(out)?;
    let lines: Vec<_> = printed.lines().collect();
    ensure!(lines.len() == 6, "unexpected output {printed}");
    ensure!(lines.first() == Some(&parts.join("postgresql/db/postgresql.conf").as_str()));
    ensure!(bin.join("pgctl").is_file());
    let conf = std::fs::read_to_string(parts.join("postgresql/db/postgresql.conf"))?;
    ensure!(conf.contains("port = 6543"));
    Ok(())
}

#[test]
#[serial]
fn recipe_environment_supplies_the_part_name() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let parts = root.join("parts");
    let bin = root.join("bin");
    std::fs::create_dir_all(parts.join("database/db"))?;
    let mut out = Vec::new();

    temp_env::with_vars(
        [
            ("PG_RECIPE_NAME", Some("database")),
            ("PG_RECIPE_PARTS_DIR", Some(parts.as_str())),
            ("PG_RECIPE_BIN_DIR", Some(bin.as_str())),
        ],
        || run_with(args(&["render", "--json"]), &mut out),
    )?;

    let report: serde_json::Value = serde_json::from_slice(&out)?;
    let server_config = report
        .get("server_config")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    ensure!(server_config == parts.join("database/db/postgresql.conf").as_str());
    Ok(())
}

#[test]
#[serial]
fn render_before_the_cluster_exists_fails_and_creates_nothing() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let parts = root.join("parts");
    let bin = root.join("bin");
    let mut out = Vec::new();

    let outcome = temp_env::with_vars_unset(["PG_RECIPE_NAME", "PG_RECIPE_OPTIONS_FILE"], || {
        run_with(
            args(&["render", "--parts-dir", parts.as_str(), "--bin-dir", bin.as_str()]),
            &mut out,
        )
    });

    let err = outcome
        .err()
        .ok_or_else(|| color_eyre::eyre::eyre!("render without a cluster should fail"))?;
    ensure!(format!("{err:#}").contains("does not exist"), "{err:#}");
    ensure!(!parts.join("postgresql/db").exists());
    ensure!(out.is_empty());
    Ok(())
}

#[test]
#[serial]
fn uninstall_without_binaries_prints_status() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let parts = root.join("parts");
    let mut out = Vec::new();

    temp_env::with_vars_unset(["PG_RECIPE_NAME"], || {
        run_with(args(&["uninstall", "--parts-dir", parts.as_str(), "--json"]), &mut out)
    })?;

    let report: serde_json::Value = serde_json::from_slice(&out)?;
    ensure!(report.get("status").and_then(serde_json::Value::as_str) == Some("no-binaries"));
    Ok(())
}
