//! Shared filesystem helpers that operate within the capability sandbox.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{
    ambient_authority,
    fs::{Dir, Permissions, PermissionsExt},
};
use color_eyre::eyre::{Context, Result};
use std::io::ErrorKind;
use tracing::debug;

use crate::observability::LOG_TARGET;

/// Resolves a path to an ambient directory handle paired with the relative path component.
///
/// Absolute paths are opened relative to the ambient root; relative paths reuse the current
/// working directory.
pub(crate) fn ambient_dir_and_path(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    if path.has_root() {
        let stripped = path
            .strip_prefix("/")
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf());
        let dir = Dir::open_ambient_dir("/", ambient_authority())
            .context("open ambient root directory")?;
        Ok((dir, stripped))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("open ambient working directory")?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Ensures the provided path exists, creating intermediate directories when required.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    debug!(target: LOG_TARGET, path = %path, "ensuring directory exists");
    dir.create_dir_all(relative.as_std_path())
        .or_else(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(err)
            }
        })
        .with_context(|| format!("create {}", path.as_str()))
}

/// Applies the provided POSIX mode to the given path when it exists.
pub(crate) fn set_permissions(path: &Utf8Path, mode: u32) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    debug!(target: LOG_TARGET, path = %path, mode = %format!("{mode:o}"), "applying permissions");
    dir.set_permissions(relative.as_std_path(), Permissions::from_mode(mode))
        .with_context(|| format!("chmod {}", path.as_str()))
}

/// Writes `contents` to `path`, replacing any existing file, then applies `mode`.
///
/// The parent directory is created first.
pub(crate) fn write_file(path: &Utf8Path, contents: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    let (dir, relative) = ambient_dir_and_path(path)?;
    dir.write(relative.as_std_path(), contents)
        .with_context(|| format!("write {}", path.as_str()))?;
    set_permissions(path, mode)
}

/// Reads `path` into a string.
pub(crate) fn read_to_string(path: &Utf8Path) -> Result<String> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    dir.read_to_string(relative.as_std_path())
        .with_context(|| format!("read {}", path.as_str()))
}

/// Removes `path` and everything beneath it; a missing path is not an error.
pub(crate) fn remove_dir_all(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    match dir.remove_dir_all(relative.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.as_str())),
    }
}

/// Moves `from` to `to`; both must live on the same filesystem.
pub(crate) fn rename(from: &Utf8Path, to: &Utf8Path) -> Result<()> {
    let (from_dir, from_relative) = ambient_dir_and_path(from)?;
    let (to_dir, to_relative) = ambient_dir_and_path(to)?;
    debug!(target: LOG_TARGET, from = %from, to = %to, "moving directory");
    from_dir
        .rename(from_relative.as_std_path(), &to_dir, to_relative.as_std_path())
        .with_context(|| format!("move {from} to {to}"))
}

/// Returns the only entry of `path` when that entry is a directory.
///
/// Tarballs usually wrap their payload in one top-level directory; callers use
/// this to strip it.
pub(crate) fn sole_subdirectory(path: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    let opened = if relative.as_str().is_empty() {
        dir.entries()
    } else {
        dir.read_dir(relative.as_std_path())
    };
    let listing = opened.with_context(|| format!("list {}", path.as_str()))?;

    let mut entries = Vec::new();
    for entry in listing {
        entries.push(entry.with_context(|| format!("list {}", path.as_str()))?);
    }
    let [only] = entries.as_slice() else {
        return Ok(None);
    };
    let is_dir = only
        .file_type()
        .with_context(|| format!("inspect entry of {}", path.as_str()))?
        .is_dir();
    let name = only.file_name();
    match (is_dir, name.to_str()) {
        (true, Some(utf8_name)) => Ok(Some(path.join(utf8_name))),
        _ => Ok(None),
    }
}
