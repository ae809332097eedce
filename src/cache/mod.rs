//! Local cache of downloaded `PostgreSQL` binary archives.
//!
//! Archives are stored once per version and platform so repeated installs
//! reuse the same download.
//!
//! # Cache Location
//!
//! The cache directory is resolved in the following order:
//!
//! 1. [`crate::Config::with_cache_dir`] when configured
//! 2. `PG_BINARY_CACHE_DIR` environment variable if set
//! 3. `$XDG_CACHE_HOME/embedded-postgres/archives` if `XDG_CACHE_HOME` is set
//! 4. `~/.cache/embedded-postgres/archives` as fallback
//!
//! # Cross-Process Coordination
//!
//! Downloads take a per-artifact file lock so parallel test runners do not
//! fetch the same archive twice.

mod config;
mod digest;
mod lock;
mod locator;

pub use config::resolve_cache_dir;
pub use digest::{archive_matches_digest, digest_path, record_digest, write_digest};
pub use lock::CacheLock;
pub use locator::{ArchiveCacheLocator, CacheEntry, CacheLocator};
#[cfg(test)]
pub use locator::MockCacheLocator;
