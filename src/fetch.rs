//! Downloads binary archives from a Maven-layout artifact repository.
//!
//! The repository publishes each distribution as a jar whose payload is a
//! single `.txz` archive. [`MavenFetcher`] downloads the jar into the cache
//! directory, copies the embedded archive out, records its digest, and
//! renames it into place so a failed download never leaves a file the cache
//! locator would accept.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use std::io::{self, Read, Seek, Write};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span};
use zip::ZipArchive;

use crate::cache::{CacheLock, digest_path, record_digest};
use crate::config::Config;
use crate::error::{FetchError, FetchErrorKind};
use crate::fs::ensure_dir_exists;
use crate::observability::FETCH_LOG_TARGET;
use crate::platform::BinaryArtifact;

const ARCHIVE_SUFFIX: &str = ".txz";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const GROUP_PATH: &str = "maven2/io/zonky/test/postgres";

/// Places the binary archive for the configured artifact at a cache path.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteFetcher: Send {
    /// Downloads the archive to `destination`.
    ///
    /// # Errors
    /// Returns a [`FetchError`] when the download or the write fails. On
    /// failure nothing is left at `destination`.
    fn fetch(&self, destination: &Utf8Path) -> Result<(), FetchError>;
}

/// Default fetcher for the `io.zonky.test.postgres` artifacts.
#[derive(Debug, Clone)]
pub struct MavenFetcher {
    repository_url: String,
    artifact: BinaryArtifact,
}

impl MavenFetcher {
    /// Creates a fetcher for `artifact` hosted under `repository_url`.
    #[must_use]
    pub fn new(repository_url: impl Into<String>, artifact: BinaryArtifact) -> Self {
        Self {
            repository_url: repository_url.into(),
            artifact,
        }
    }

    /// Creates a fetcher for the configured version on the current platform.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.repository_url(),
            BinaryArtifact::for_current_platform(config.version().clone()),
        )
    }

    /// Returns the jar URL for the configured artifact.
    ///
    /// # Examples
    /// ```
    /// use pg_embedded_lifecycle::fetch::MavenFetcher;
    /// use pg_embedded_lifecycle::{BinaryArtifact, PostgresVersion};
    ///
    /// let fetcher = MavenFetcher::new(
    ///     "https://repo1.maven.org/",
    ///     BinaryArtifact::new("linux", "amd64", PostgresVersion::V12),
    /// );
    /// assert_eq!(
    ///     fetcher.download_url(),
    ///     "https://repo1.maven.org/maven2/io/zonky/test/postgres/\
    ///      embedded-postgres-binaries-linux-amd64/12.1.0/\
    ///      embedded-postgres-binaries-linux-amd64-12.1.0.jar"
    /// );
    /// ```
    #[must_use]
    pub fn download_url(&self) -> String {
        format!(
            "{}/{GROUP_PATH}/{}/{}/{}.jar",
            self.repository_url.trim_end_matches('/'),
            self.artifact.artifact_id(),
            self.artifact.version(),
            self.artifact.file_stem(),
        )
    }

    fn download_jar(&self, cache_dir: &Utf8Path) -> Result<NamedTempFile, FetchError> {
        let url = self.download_url();
        info!(target: FETCH_LOG_TARGET, url = %url, "downloading postgres binaries");

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        let response = agent
            .get(&url)
            .call()
            .map_err(|err| self.map_http_error(err))?;

        let mut jar = NamedTempFile::new_in(cache_dir)
            .context("failed to create temporary download file")
            .map_err(write_error)?;
        let bytes = io::copy(&mut response.into_reader(), &mut jar).map_err(|err| {
            FetchError::new(
                FetchErrorKind::Network,
                eyre!("download of {url} interrupted: {err}"),
            )
        })?;
        jar.flush()
            .context("failed to flush downloaded jar")
            .map_err(write_error)?;
        debug!(target: FETCH_LOG_TARGET, bytes, "download complete");
        Ok(jar)
    }

    fn map_http_error(&self, err: ureq::Error) -> FetchError {
        match err {
            ureq::Error::Status(404, _) => FetchError::new(
                FetchErrorKind::NotFound,
                eyre!("no version found matching {}", self.artifact.version()),
            ),
            ureq::Error::Status(code, _) => FetchError::new(
                FetchErrorKind::Status,
                eyre!("repository returned status {code} for {}", self.download_url()),
            ),
            ureq::Error::Transport(transport) => FetchError::new(
                FetchErrorKind::Network,
                eyre!("unable to reach {}: {transport}", self.download_url()),
            ),
        }
    }
}

impl RemoteFetcher for MavenFetcher {
    fn fetch(&self, destination: &Utf8Path) -> Result<(), FetchError> {
        let _span =
            info_span!(target: FETCH_LOG_TARGET, "fetch", artifact = %self.artifact).entered();
        let cache_dir = parent_dir(destination)?;
        ensure_dir_exists(&cache_dir).map_err(write_error)?;

        let _lock = CacheLock::acquire(&cache_dir, &self.artifact.file_stem())
            .context("failed to lock cache entry")
            .map_err(write_error)?;
        if destination.is_file() {
            debug!(
                target: FETCH_LOG_TARGET,
                path = %destination,
                "archive appeared while waiting for the cache lock"
            );
            return Ok(());
        }

        let jar = self.download_jar(&cache_dir)?;
        let jar_file = jar
            .reopen()
            .context("failed to reopen downloaded jar")
            .map_err(write_error)?;
        let archive = extract_embedded_archive(jar_file, &cache_dir)?;
        let staged = Utf8Path::from_path(archive.path())
            .ok_or_else(|| write_error(eyre!("staging path for {destination} is not UTF-8")))?;
        record_digest(staged, destination).map_err(write_error)?;
        if let Err(err) = archive.persist(destination.as_std_path()) {
            discard_sidecar(destination);
            return Err(write_error(eyre!(
                "failed to move archive to {destination}: {err}"
            )));
        }
        info!(target: FETCH_LOG_TARGET, path = %destination, "cached postgres archive");
        Ok(())
    }
}

/// Copies the first `.txz` entry of `jar` into a temporary file in `dir`.
///
/// # Errors
/// Returns [`FetchErrorKind::MissingArchive`] when the jar is unreadable or
/// holds no archive, and [`FetchErrorKind::Write`] when the copy fails.
pub fn extract_embedded_archive<R: Read + Seek>(
    jar: R,
    dir: &Utf8Path,
) -> Result<NamedTempFile, FetchError> {
    let mut zip = ZipArchive::new(jar).map_err(|err| {
        FetchError::new(
            FetchErrorKind::MissingArchive,
            eyre!("downloaded artifact is not a valid jar: {err}"),
        )
    })?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .context("failed to read jar entry")
            .map_err(|report| FetchError::new(FetchErrorKind::MissingArchive, report))?;
        if !entry.name().ends_with(ARCHIVE_SUFFIX) {
            continue;
        }

        let mut archive = NamedTempFile::new_in(dir)
            .context("failed to create temporary archive file")
            .map_err(write_error)?;
        io::copy(&mut entry, &mut archive)
            .with_context(|| format!("failed to copy {} out of the jar", entry.name()))
            .map_err(write_error)?;
        archive
            .flush()
            .context("failed to flush archive")
            .map_err(write_error)?;
        return Ok(archive);
    }

    Err(FetchError::new(
        FetchErrorKind::MissingArchive,
        eyre!("error fetching postgres: cannot find binary in archive"),
    ))
}

fn parent_dir(destination: &Utf8Path) -> Result<Utf8PathBuf, FetchError> {
    destination
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| write_error(eyre!("cache path {destination} has no parent directory")))
}

fn discard_sidecar(destination: &Utf8Path) {
    let sidecar = digest_path(destination);
    if let Err(err) = std::fs::remove_file(&sidecar) {
        debug!(target: FETCH_LOG_TARGET, path = %sidecar, error = %err, "failed to remove digest");
    }
}

fn write_error(report: color_eyre::Report) -> FetchError {
    FetchError::new(FetchErrorKind::Write, report)
}
