//! Filesystem helpers that route through `cap-std` ambient directory handles.
//!
//! Each helper opens the deepest directory that already exists through the
//! ambient authority, which resolves symlinks the same way the OS does, and
//! applies the operation beneath that handle.

use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use cap_std::fs::{Permissions, PermissionsExt};
use cap_std::{ambient_authority, fs::Dir};
use color_eyre::eyre::{Context, Result, eyre};
use std::io::{self, ErrorKind};

/// Opens the directory containing `path` and returns it with the final
/// component.
fn open_parent(path: &Utf8Path) -> Result<(io::Result<Dir>, &str)> {
    let name = path
        .file_name()
        .ok_or_else(|| eyre!("{path} has no final component"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    Ok((Dir::open_ambient_dir(parent, ambient_authority()), name))
}

/// Splits `path` into its deepest existing ancestor and the missing tail.
fn existing_ancestor(path: &Utf8Path) -> (&Utf8Path, Utf8PathBuf) {
    for ancestor in path.ancestors() {
        if ancestor.as_str().is_empty() {
            break;
        }
        if ancestor.is_dir() {
            let tail = path
                .strip_prefix(ancestor)
                .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf);
            return (ancestor, tail);
        }
    }
    (Utf8Path::new("."), path.to_path_buf())
}

/// Creates `path` and any missing parents.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let (base, tail) = existing_ancestor(path);
    if tail.as_str().is_empty() {
        return Ok(());
    }
    let dir = Dir::open_ambient_dir(base, ambient_authority())
        .with_context(|| format!("open {base}"))?;

    match dir.create_dir_all(tail.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err).with_context(|| format!("create {path}")),
    }
}

/// Removes `path` and everything beneath it. A missing path is not an error.
pub(crate) fn remove_dir_all_if_exists(path: &Utf8Path) -> Result<()> {
    let (parent, name) = open_parent(path)?;
    let dir = match parent {
        Ok(dir) => dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("remove {path}")),
    };

    match dir.remove_dir_all(name) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {path}")),
    }
}

/// Applies the provided POSIX mode to the given path.
#[cfg(unix)]
pub(crate) fn set_permissions(path: &Utf8Path, mode: u32) -> Result<()> {
    let (parent, name) = open_parent(path)?;
    parent
        .and_then(|dir| dir.set_permissions(name, Permissions::from_mode(mode)))
        .with_context(|| format!("chmod {mode:o} {path}"))
}
