//! Maps the configured artifact onto an archive path in the cache.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::config::resolve_cache_dir;
use crate::config::Config;
use crate::observability::CACHE_LOG_TARGET;
use crate::platform::BinaryArtifact;

/// File extension of cached archives (`tar.xz`).
const ARCHIVE_EXTENSION: &str = "txz";

/// Resolved location of a cached archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Absolute path of the archive file.
    pub path: Utf8PathBuf,
    /// Whether the archive is present on disk.
    pub exists: bool,
}

impl CacheEntry {
    /// Builds an entry for `path`, probing the filesystem for existence.
    #[must_use]
    pub fn probe(path: Utf8PathBuf) -> Self {
        let exists = path.is_file();
        Self { path, exists }
    }
}

/// Computes where the archive for the current configuration lives.
///
/// Implementations must be deterministic for the lifetime of the process so
/// that `install`, `start` and `stop` agree on the extraction directory.
#[cfg_attr(test, mockall::automock)]
pub trait CacheLocator: Send {
    /// Returns the archive path and whether it exists.
    fn locate(&self) -> CacheEntry;
}

/// Default locator: `<cache_dir>/<artifact file stem>.txz`.
///
/// # Examples
/// ```
/// use pg_embedded_lifecycle::cache::{ArchiveCacheLocator, CacheLocator};
/// use pg_embedded_lifecycle::{BinaryArtifact, PostgresVersion};
///
/// let locator = ArchiveCacheLocator::new(
///     "/var/cache/pg".into(),
///     BinaryArtifact::new("linux", "amd64", PostgresVersion::V12),
/// );
/// let entry = locator.locate();
/// assert_eq!(
///     entry.path.as_str(),
///     "/var/cache/pg/embedded-postgres-binaries-linux-amd64-12.1.0.txz"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveCacheLocator {
    cache_dir: Utf8PathBuf,
    artifact: BinaryArtifact,
}

impl ArchiveCacheLocator {
    /// Creates a locator rooted at `cache_dir`.
    #[must_use]
    pub const fn new(cache_dir: Utf8PathBuf, artifact: BinaryArtifact) -> Self {
        Self {
            cache_dir,
            artifact,
        }
    }

    /// Creates a locator for the configured version on the current platform.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let cache_dir = config
            .cache_dir()
            .map_or_else(resolve_cache_dir, Utf8Path::to_path_buf);
        Self::new(
            cache_dir,
            BinaryArtifact::for_current_platform(config.version().clone()),
        )
    }

    /// Returns the directory holding cached archives.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    /// Returns the artifact this locator resolves.
    #[must_use]
    pub const fn artifact(&self) -> &BinaryArtifact {
        &self.artifact
    }

    /// Returns the archive path without probing the filesystem.
    #[must_use]
    pub fn archive_path(&self) -> Utf8PathBuf {
        self.cache_dir
            .join(format!("{}.{ARCHIVE_EXTENSION}", self.artifact.file_stem()))
    }
}

impl CacheLocator for ArchiveCacheLocator {
    fn locate(&self) -> CacheEntry {
        let entry = CacheEntry::probe(self.archive_path());
        debug!(
            target: CACHE_LOG_TARGET,
            path = %entry.path,
            exists = entry.exists,
            "resolved cache entry"
        );
        entry
    }
}
