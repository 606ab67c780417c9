//! Behavioural tests for the bootstrap configuration set on disk.

use std::os::unix::fs::PermissionsExt;

use camino::Utf8Path;
use color_eyre::eyre::{Result, ensure};
use pg_provision::test_support::{option_map, sandbox_context, utf8_tempdir};
use pg_provision::{InstanceConfig, ProvisionErrorKind, RenderedConfigSet, write_bootstrap_config};
use rstest::rstest;

/// Resolves `pairs` and lays out an empty data directory, as `initdb` would.
fn resolve(root: &Utf8Path, pairs: &[(&str, &str)]) -> Result<InstanceConfig> {
    let cfg = InstanceConfig::resolve(&sandbox_context(root), &option_map(pairs))?;
    std::fs::create_dir_all(cfg.data_dir())?;
    Ok(cfg)
}

fn snapshot(set: &RenderedConfigSet) -> Result<Vec<(String, String)>> {
    set.paths()
        .map(|path| Ok((path.to_string(), std::fs::read_to_string(path)?)))
        .collect()
}

fn mode(path: &Utf8Path) -> Result<u32> {
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o777)
}

#[test]
fn repeated_emission_is_byte_identical() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(&root, &[("users", "app"), ("port", "6543"), ("work_mem", "2MB")])?;

    let first = write_bootstrap_config(&cfg)?;
    let before = snapshot(&first)?;
    let second = write_bootstrap_config(&cfg)?;
    let after = snapshot(&second)?;

    ensure!(first == second);
    ensure!(before == after);
    Ok(())
}

#[test]
fn files_are_written_with_restrictive_modes() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(&root, &[])?;

    let set = write_bootstrap_config(&cfg)?;

    ensure!(mode(&set.server_config)? == 0o600);
    ensure!(mode(&set.hba_config)? == 0o600);
    ensure!(set.scripts.len() == 4);
    for script in &set.scripts {
        ensure!(mode(script)? == 0o755, "{script} is not executable");
    }
    Ok(())
}

#[test]
fn scripts_land_in_the_orchestrator_bin_directory() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(&root, &[])?;

    let set = write_bootstrap_config(&cfg)?;

    let names: Vec<_> = set.scripts.iter().filter_map(|path| path.file_name()).collect();
    ensure!(names == ["pgctl", "psql", "createuser", "createdb"]);
    ensure!(set.scripts.iter().all(|path| path.starts_with(root.join("bin"))));

    let pgctl = std::fs::read_to_string(root.join("bin/pgctl"))?;
    ensure!(pgctl.starts_with("#!/bin/sh\n"));
    ensure!(pgctl.contains(&format!("'{}'/pg_ctl", cfg.bin_dir())));
    ensure!(pgctl.contains(&format!("-D '{}'", cfg.data_dir())));
    Ok(())
}

#[test]
fn server_config_carries_port_and_tuning() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(
        &root,
        &[("port", "6543"), ("listen_addresses", "localhost"), ("shared_buffers", "64MB")],
    )?;

    let set = write_bootstrap_config(&cfg)?;
    let conf = std::fs::read_to_string(&set.server_config)?;

    ensure!(conf.contains("port = 6543"));
    ensure!(conf.contains("listen_addresses = 'localhost'"));
    ensure!(conf.contains("shared_buffers = '64MB'"));
    ensure!(conf.contains("work_mem = '1MB'"));
    Ok(())
}

#[rstest]
#[case::defaults(&[], &["postgres", "root"], &[])]
#[case::users_only_reach_their_database(&[("users", "app web")], &["postgres", "root"], &["app", "web"])]
#[case::duplicates_collapse(&[("superusers", "root postgres root"), ("users", "root")], &["postgres", "root"], &[])]
fn hba_lists_every_role_once(
    #[case] pairs: &[(&str, &str)],
    #[case] privileged: &[&str],
    #[case] restricted: &[&str],
) -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(&root, pairs)?;

    let set = write_bootstrap_config(&cfg)?;
    let hba = std::fs::read_to_string(&set.hba_config)?;
    let entries: Vec<_> = hba.lines().filter(|line| line.starts_with("local")).collect();

    ensure!(entries.len() == privileged.len() + restricted.len(), "entries: {entries:?}");
    for name in privileged {
        let line = format!("local   {:<15} {name:<15} trust", "all");
        ensure!(entries.contains(&line.as_str()), "missing {line:?} in {entries:?}");
    }
    for name in restricted {
        let line = format!("local   {:<15} {name:<15} trust", "sameuser");
        ensure!(entries.contains(&line.as_str()), "missing {line:?} in {entries:?}");
    }
    ensure!(hba.contains("(PostgreSQL unknown)"));
    Ok(())
}

#[test]
fn hba_header_reports_the_cluster_version() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = resolve(&root, &[])?;
    std::fs::create_dir_all(cfg.data_dir())?;
    std::fs::write(cfg.data_dir().join("PG_VERSION"), "15\n")?;

    let set = write_bootstrap_config(&cfg)?;
    let hba = std::fs::read_to_string(&set.hba_config)?;

    ensure!(hba.contains("(PostgreSQL 15)"));
    Ok(())
}

#[test]
fn emission_without_a_cluster_writes_nothing() -> Result<()> {
    let (_temp, root) = utf8_tempdir();
    let cfg = InstanceConfig::resolve(&sandbox_context(&root), &option_map(&[]))?;

    let err = write_bootstrap_config(&cfg)
        .err()
        .ok_or_else(|| color_eyre::eyre::eyre!("emission needs a data directory"))?;

    ensure!(err.kind() == ProvisionErrorKind::ClusterInit);
    ensure!(err.to_string().contains("does not exist"), "{err}");
    ensure!(!cfg.data_dir().exists());
    ensure!(!root.join("bin/pgctl").exists());
    Ok(())
}
