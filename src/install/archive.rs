//! Prebuilt archive download and extraction.

use std::fs::File;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, Result, eyre};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use crate::fs::{ensure_dir_exists, rename, sole_subdirectory};
use crate::observability::LOG_TARGET;

const ARCH_PLACEHOLDERS: [&str; 2] = ["%(arch)s", "{arch}"];
const STAGING_PREFIX: &str = ".pg-provision-";

/// Replaces the architecture placeholders in `url` with the machine type
/// reported by `uname`, e.g. `x86_64` or `arm64`.
///
/// # Errors
/// Returns an error when `uname` fails or reports a non-UTF-8 machine type.
///
/// # Examples
/// ```
/// use pg_provision::install::expand_arch;
///
/// let machine = nix::sys::utsname::uname()?;
/// let url = expand_arch("https://example.invalid/pg-16-{arch}.tar.gz")?;
/// assert_eq!(
///     url,
///     format!("https://example.invalid/pg-16-{}.tar.gz", machine.machine().to_string_lossy())
/// );
/// # Ok::<(), color_eyre::Report>(())
/// ```
pub fn expand_arch(url: &str) -> Result<String> {
    let uts = nix::sys::utsname::uname().context("uname")?;
    let machine = uts
        .machine()
        .to_str()
        .ok_or_else(|| eyre!("machine type {:?} is not UTF-8", uts.machine()))?;
    Ok(substitute_arch(url, machine))
}

fn substitute_arch(url: &str, machine: &str) -> String {
    ARCH_PLACEHOLDERS
        .iter()
        .fold(url.to_owned(), |acc, placeholder| acc.replace(placeholder, machine))
}

/// Downloads the gzip tarball at `url` and unpacks it so its payload becomes `dest`.
///
/// The tarball is unpacked into a staging directory beside `dest` first. A
/// single top-level directory in the tarball is stripped, so both
/// `postgresql-16/bin/...` and `bin/...` layouts yield `dest/bin`.
///
/// # Errors
/// Returns an error when the archive cannot be fetched or unpacked, or when
/// the payload cannot be moved into place.
pub fn fetch_archive(url: &str, dest: &Utf8Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| eyre!("install root {dest} has no parent directory"))?;
    ensure_dir_exists(parent)?;
    let staging = staging_dir(parent)?;

    info!(target: LOG_TARGET, url, "downloading PostgreSQL binaries");
    unpack_into(url, &staging.path)?;

    let payload = sole_subdirectory(&staging.path)?.unwrap_or_else(|| staging.path.clone());
    rename(&payload, dest)
}

/// Staging directory removed on drop unless its contents were moved away.
pub(crate) struct Staging {
    _guard: tempfile::TempDir,
    pub(crate) path: Utf8PathBuf,
}

pub(crate) fn staging_dir(parent: &Utf8Path) -> Result<Staging> {
    let guard = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent.as_std_path())
        .with_context(|| format!("create staging directory in {parent}"))?;
    let path = Utf8PathBuf::from_path_buf(guard.path().to_path_buf())
        .map_err(|path| eyre!("staging directory {} is not valid UTF-8", path.display()))?;
    Ok(Staging {
        _guard: guard,
        path,
    })
}

/// Unpacks the gzip tarball at `url` into `target`.
pub(crate) fn unpack_into(url: &str, target: &Utf8Path) -> Result<()> {
    let reader = open_source(url)?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    archive
        .unpack(target.as_std_path())
        .with_context(|| format!("unpack {url} into {target}"))?;
    debug!(target: LOG_TARGET, url, target = %target, "archive unpacked");
    Ok(())
}

fn open_source(url: &str) -> Result<Box<dyn Read>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::blocking::get(url)
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("download {url}"))?;
        return Ok(Box::new(response));
    }

    let local = url.strip_prefix("file://").unwrap_or(url);
    let file = File::open(local).with_context(|| format!("open archive {local}"))?;
    Ok(Box::new(file))
}
