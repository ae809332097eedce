//! Cache population, extraction and data directory initialisation.

use std::io::ErrorKind;

use camino::Utf8Path;
use color_eyre::eyre::eyre;
use tracing::{debug, info, info_span};

use super::EmbeddedPostgres;
use crate::archive::extract_txz;
use crate::cache::{CacheEntry, archive_matches_digest, digest_path};
use crate::error::{ExtractError, FetchError, FetchErrorKind, Result};
use crate::fs::remove_dir_all_if_exists;
use crate::observability::{CACHE_LOG_TARGET, LOG_TARGET};

impl EmbeddedPostgres {
    /// Places the binaries and an initialised data directory on disk.
    ///
    /// The archive is fetched only when the cache has no usable copy. The
    /// extraction directory is always removed and unpacked again, so files
    /// left by a previous install never survive. The server state is not
    /// changed.
    ///
    /// # Errors
    /// Returns [`crate::LifecycleError::Fetch`],
    /// [`crate::LifecycleError::Extract`] or [`crate::LifecycleError::Init`]
    /// for failures in the respective step.
    pub fn install(&mut self) -> Result<()> {
        let _span =
            info_span!(target: LOG_TARGET, "install", version = %self.config.version()).entered();

        let entry = self.ensure_cached_archive()?;
        let extract_dir = self.extraction_dir_for(&entry.path);
        debug!(target: LOG_TARGET, path = %extract_dir, "replacing extraction directory");
        remove_dir_all_if_exists(&extract_dir).map_err(ExtractError::from)?;
        extract_txz(&entry.path, &extract_dir)?;
        self.initializer.init(&extract_dir, &self.config)?;

        info!(target: LOG_TARGET, path = %extract_dir, "postgres installed");
        Ok(())
    }

    fn ensure_cached_archive(&self) -> std::result::Result<CacheEntry, FetchError> {
        let entry = self.locator.locate();
        if entry.exists {
            if archive_matches_digest(&entry.path) {
                debug!(target: CACHE_LOG_TARGET, path = %entry.path, "cache hit");
                return Ok(entry);
            }
            discard_archive(&entry.path)?;
        }

        info!(target: CACHE_LOG_TARGET, path = %entry.path, "cache miss; fetching archive");
        self.fetcher.fetch(&entry.path)?;
        Ok(CacheEntry {
            path: entry.path,
            exists: true,
        })
    }
}

/// Removes a cached archive and its digest sidecar.
fn discard_archive(archive: &Utf8Path) -> std::result::Result<(), FetchError> {
    for stale in [archive.to_path_buf(), digest_path(archive)] {
        match std::fs::remove_file(&stale) {
            Ok(()) => debug!(target: CACHE_LOG_TARGET, path = %stale, "removed stale cache file"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(FetchError::new(
                    FetchErrorKind::Write,
                    eyre!("unable to discard stale cache file {stale}: {err}"),
                ));
            }
        }
    }
    Ok(())
}
