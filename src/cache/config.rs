//! Resolves the archive cache directory from environment variables with
//! XDG-compliant fallback paths.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Subdirectory path within the XDG cache home.
const CACHE_SUBDIR: &str = "embedded-postgres/archives";

/// Resolves the archive cache directory from environment and XDG conventions.
///
/// The resolution order is:
///
/// 1. `PG_BINARY_CACHE_DIR` environment variable if set and valid UTF-8
/// 2. `$XDG_CACHE_HOME/embedded-postgres/archives` if `XDG_CACHE_HOME` is set
/// 3. `~/.cache/embedded-postgres/archives` as fallback
/// 4. `/tmp/embedded-postgres/archives` as last resort
///
/// # Examples
///
/// ```
/// use pg_embedded_lifecycle::cache::resolve_cache_dir;
///
/// let cache_dir = resolve_cache_dir();
/// assert!(!cache_dir.as_str().is_empty());
/// ```
#[must_use]
pub fn resolve_cache_dir() -> Utf8PathBuf {
    resolve_from_env()
        .or_else(resolve_from_xdg_cache)
        .or_else(resolve_from_home)
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp").join(CACHE_SUBDIR))
}

fn resolve_from_env() -> Option<Utf8PathBuf> {
    non_empty_env_path("PG_BINARY_CACHE_DIR")
}

fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    Some(non_empty_env_path("XDG_CACHE_HOME")?.join(CACHE_SUBDIR))
}

fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".cache").join(CACHE_SUBDIR))
}

fn non_empty_env_path(key: &str) -> Option<Utf8PathBuf> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()
}
