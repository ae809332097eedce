//! Unpacks `tar.xz` binary distributions.

use camino::Utf8Path;
use color_eyre::eyre::{Context, eyre};
use std::fs::File;
use std::io::BufReader;
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

use crate::error::ExtractError;
use crate::fs::ensure_dir_exists;
use crate::observability::LOG_TARGET;

/// Unpacks the `tar.xz` archive at `archive` into `target`.
///
/// `target` is created when missing. Entries that would escape `target` are
/// rejected by the `tar` crate.
///
/// # Errors
/// Returns an [`ExtractError`] when the archive cannot be opened, is not a
/// valid `tar.xz` stream, or an entry cannot be written.
pub fn extract_txz(archive: &Utf8Path, target: &Utf8Path) -> Result<(), ExtractError> {
    debug!(target: LOG_TARGET, archive = %archive, target_dir = %target, "extracting archive");

    ensure_dir_exists(target).map_err(ExtractError::from)?;
    let file = File::open(archive)
        .with_context(|| format!("unable to open postgres archive {archive}"))
        .map_err(ExtractError::from)?;

    let mut tarball = Archive::new(XzDecoder::new(BufReader::new(file)));
    tarball.set_overwrite(true);
    tarball
        .unpack(target.as_std_path())
        .map_err(|err| {
            ExtractError::from(eyre!(
                "unable to extract postgres archive {archive} to {target}: {err}"
            ))
        })
}
