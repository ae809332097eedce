//! SHA-256 sidecars recorded next to cached archives.
//!
//! A fetch writes `<archive>.sha256` before the archive is moved into place. Later
//! installs compare the archive against it so a truncated or tampered entry
//! is fetched again rather than extracted.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use tracing::warn;

use crate::observability::CACHE_LOG_TARGET;

const DIGEST_EXTENSION: &str = "sha256";

/// Returns the sidecar path for `archive`.
#[must_use]
pub fn digest_path(archive: &Utf8Path) -> Utf8PathBuf {
    let mut name = archive.file_name().unwrap_or_default().to_owned();
    name.push('.');
    name.push_str(DIGEST_EXTENSION);
    archive.with_file_name(name)
}

/// Hashes `archive` and records the hex digest in its sidecar.
///
/// # Errors
/// Returns an error when the archive cannot be read or the sidecar cannot be
/// written.
pub fn write_digest(archive: &Utf8Path) -> Result<String> {
    record_digest(archive, archive)
}

/// Hashes `source` and records the digest in the sidecar for `archive`.
///
/// Used when `source` is a staging file that is renamed to `archive` once
/// the sidecar exists.
///
/// # Errors
/// Returns an error when `source` cannot be read or the sidecar cannot be
/// written.
pub fn record_digest(source: &Utf8Path, archive: &Utf8Path) -> Result<String> {
    let digest = hash_file(source)?;
    let sidecar = digest_path(archive);
    fs::write(&sidecar, &digest).with_context(|| format!("write digest {sidecar}"))?;
    Ok(digest)
}

/// Checks `archive` against its sidecar.
///
/// Archives without a sidecar are trusted. Unreadable archives and digest
/// mismatches report `false`.
#[must_use]
pub fn archive_matches_digest(archive: &Utf8Path) -> bool {
    let sidecar = digest_path(archive);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(contents) => contents.trim().to_owned(),
        Err(err) if err.kind() == ErrorKind::NotFound => return true,
        Err(err) => {
            warn!(target: CACHE_LOG_TARGET, path = %sidecar, error = %err, "unreadable digest sidecar");
            return false;
        }
    };

    match hash_file(archive) {
        Ok(actual) if actual == expected => true,
        Ok(actual) => {
            warn!(
                target: CACHE_LOG_TARGET,
                path = %archive,
                expected = %expected,
                actual = %actual,
                "cached archive digest mismatch"
            );
            false
        }
        Err(err) => {
            warn!(target: CACHE_LOG_TARGET, path = %archive, error = %err, "failed to hash cached archive");
            false
        }
    }
}

fn hash_file(path: &Utf8Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {path}"))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("read {path}"))?;
        let Some(chunk) = buffer.get(..read) else {
            break;
        };
        if chunk.is_empty() {
            break;
        }
        hasher.update(chunk);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn archive_in(dir: &tempfile::TempDir) -> Utf8PathBuf {
        let root = Utf8Path::from_path(dir.path()).expect("utf8 path");
        let archive = root.join("pg.txz");
        fs::write(&archive, b"archive bytes").expect("write archive");
        archive
    }

    #[test]
    fn digest_path_appends_extension() {
        let sidecar = digest_path(Utf8Path::new("/cache/pg-12.1.0.txz"));
        assert_eq!(sidecar.as_str(), "/cache/pg-12.1.0.txz.sha256");
    }

    #[test]
    fn archives_without_sidecar_are_trusted() {
        let temp = tempdir().expect("tempdir");
        let archive = archive_in(&temp);
        assert!(archive_matches_digest(&archive));
    }

    #[test]
    fn recorded_digest_matches_unchanged_archive() {
        let temp = tempdir().expect("tempdir");
        let archive = archive_in(&temp);

        let digest = write_digest(&archive).expect("write digest");

        assert_eq!(digest.len(), 64);
        assert!(archive_matches_digest(&archive));
    }

    #[test]
    fn staged_digest_matches_renamed_archive() {
        let temp = tempdir().expect("tempdir");
        let staged = archive_in(&temp);
        let archive = staged.with_file_name("final.txz");

        record_digest(&staged, &archive).expect("record digest");
        fs::rename(&staged, &archive).expect("rename archive");

        assert!(digest_path(&archive).is_file());
        assert!(archive_matches_digest(&archive));
    }

    #[test]
    fn modified_archive_fails_digest_check() {
        let temp = tempdir().expect("tempdir");
        let archive = archive_in(&temp);
        write_digest(&archive).expect("write digest");

        fs::write(&archive, b"truncated").expect("overwrite archive");

        assert!(!archive_matches_digest(&archive));
    }
}
