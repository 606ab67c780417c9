//! Filesystem fixtures shared by unit and integration tests.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, Result, eyre};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, Header};

use crate::fs::{ensure_dir_exists, write_file};
use crate::settings::{OptionMap, RecipeContext};

/// Creates a temporary directory and returns it with its UTF-8 path.
///
/// # Panics
/// Panics when the directory cannot be created or its path is not UTF-8.
#[must_use]
pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap_or_else(|err| panic!("create tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("tempdir is not UTF-8: {}", path.display()));
    (temp, path)
}

/// Context for a part named `postgresql` living under `root`.
#[must_use]
pub fn sandbox_context(root: &Utf8Path) -> RecipeContext {
    RecipeContext::new("postgresql", root.join("parts"), root.join("bin"))
}

/// Builds an option map from literal pairs.
#[must_use]
pub fn option_map(pairs: &[(&str, &str)]) -> OptionMap {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// Writes a gzip tarball at `path` holding `entries` as `(path, contents)` pairs.
///
/// # Errors
/// Returns an error when the tarball cannot be written.
pub fn write_tarball(path: &Utf8Path, entries: &[(&str, &str)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("create {path}"))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, contents) in entries {
        let mut header = Header::new_gnu();
        header.set_size(u64::try_from(contents.len()).context("entry too large")?);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .with_context(|| format!("append {name}"))?;
    }
    builder
        .into_inner()
        .context("finish tar stream")?
        .finish()
        .context("finish gzip stream")?;
    Ok(())
}

/// Lays out an install root as if the binaries had already been fetched.
///
/// # Errors
/// Returns an error when the directory or the placeholder `pg_ctl` cannot be
/// created.
pub fn preinstalled(install_root: &Utf8Path) -> Result<()> {
    let bin = install_root.join("bin");
    ensure_dir_exists(&bin)?;
    write_file(&bin.join("pg_ctl"), "#!/bin/sh\nexit 0\n", 0o755)
        .map_err(|err| eyre!("create placeholder pg_ctl: {err}"))
}
