//! Orchestrates install, start, database creation and stop for one server.
//!
//! [`EmbeddedPostgres`] owns its configuration and collaborators and tracks a
//! single [`ServerState`]. Every state-changing operation takes `&mut self`,
//! so one instance is driven by one owner at a time.

mod builder;
mod install;
#[cfg(test)]
mod tests;

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, info_span, warn};

pub use builder::EmbeddedPostgresBuilder;

use crate::cache::{CacheEntry, CacheLocator};
use crate::config::Config;
use crate::database::DatabaseCreator;
use crate::error::{ConfigResult, CreateDatabaseError, LifecycleError, Result, StopError};
use crate::fetch::RemoteFetcher;
use crate::init::DatabaseInitializer;
use crate::observability::LOG_TARGET;
use crate::port::ensure_port_available;
use crate::process::{self, ServerController};

/// Directory created next to the cached archive when no runtime path is
/// configured.
pub const EXTRACTED_DIR_NAME: &str = "extracted";

/// Whether the lifecycle believes the server is running.
///
/// The state is process-local. A server killed externally leaves it at
/// [`ServerState::Started`] until [`EmbeddedPostgres::stop`] is called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerState {
    /// No server has been started, or the last one was stopped.
    #[default]
    Stopped,
    /// `start` succeeded and no stop has happened since.
    Started,
}

/// Embedded `PostgreSQL` server driven through an explicit lifecycle.
///
/// # Examples
/// ```no_run
/// use pg_embedded_lifecycle::{Config, EmbeddedPostgres};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default()
///     .with_port(15432)
///     .with_username("pg")
///     .with_password("pw")
///     .with_database("testdb");
/// let mut postgres = EmbeddedPostgres::new(config)?;
/// postgres.install()?;
/// postgres.start()?;
/// postgres.create_database()?;
/// postgres.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct EmbeddedPostgres {
    config: Config,
    locator: Box<dyn CacheLocator>,
    fetcher: Box<dyn RemoteFetcher>,
    initializer: Box<dyn DatabaseInitializer>,
    controller: Box<dyn ServerController>,
    creator: Box<dyn DatabaseCreator>,
    state: ServerState,
}

impl EmbeddedPostgres {
    /// Creates a lifecycle with the default collaborators for `config`.
    ///
    /// # Errors
    /// Returns a [`crate::ConfigError`] when `config` fails validation.
    pub fn new(config: Config) -> ConfigResult<Self> {
        Self::builder(config).build()
    }

    /// Starts a builder that allows replacing individual collaborators.
    #[must_use]
    pub const fn builder(config: Config) -> EmbeddedPostgresBuilder {
        EmbeddedPostgresBuilder::new(config)
    }

    /// Returns the configuration this lifecycle was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Reports whether `start` succeeded and no stop has happened since.
    ///
    /// No liveness probe is performed.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state == ServerState::Started
    }

    /// Resolves the cached archive path and whether it is present.
    #[must_use]
    pub fn cache_entry(&self) -> CacheEntry {
        self.locator.locate()
    }

    /// Returns the directory the binaries are extracted into.
    ///
    /// This is the configured runtime path when set, otherwise the
    /// `extracted` directory next to the cached archive.
    #[must_use]
    pub fn extraction_dir(&self) -> Utf8PathBuf {
        let entry = self.cache_entry();
        self.extraction_dir_for(&entry.path)
    }

    /// Returns the data directory inside [`Self::extraction_dir`].
    #[must_use]
    pub fn data_dir(&self) -> Utf8PathBuf {
        process::data_dir(&self.extraction_dir())
    }

    /// Starts the server on the configured port and waits until it is ready.
    ///
    /// # Errors
    /// Returns [`LifecycleError::AlreadyStarted`] when the server is already
    /// running, [`LifecycleError::PortUnavailable`] when the port is bound by
    /// another listener, and [`LifecycleError::Start`] when `pg_ctl` fails.
    pub fn start(&mut self) -> Result<()> {
        let port = self.config.port();
        let _span = info_span!(target: LOG_TARGET, "start", port).entered();
        if self.is_started() {
            return Err(LifecycleError::AlreadyStarted);
        }

        ensure_port_available(port)?;
        let extract_dir = self.extraction_dir();
        self.controller.start(&extract_dir, port)?;
        self.state = ServerState::Started;
        info!(target: LOG_TARGET, port, path = %extract_dir, "postgres started");
        Ok(())
    }

    /// Stops the running server.
    ///
    /// The cached archive need not exist: the extraction directory is derived
    /// from the locator path alone.
    ///
    /// # Errors
    /// Returns [`LifecycleError::NotStarted`] when the server is not running
    /// and [`LifecycleError::Stop`] when `pg_ctl` fails. A failed stop leaves
    /// the state at [`ServerState::Started`].
    pub fn stop(&mut self) -> Result<()> {
        let _span = info_span!(target: LOG_TARGET, "stop", port = self.config.port()).entered();
        if !self.is_started() {
            return Err(LifecycleError::NotStarted);
        }
        self.stop_server()?;
        Ok(())
    }

    /// Creates the configured database on the running server.
    ///
    /// When creation fails the server is stopped before the error is
    /// returned.
    ///
    /// # Errors
    /// Returns [`LifecycleError::NotStarted`] when the server is not running,
    /// [`LifecycleError::CreateDatabase`] when creation fails and the server
    /// was stopped, and [`LifecycleError::CreateDatabaseCleanup`] when the
    /// follow-up stop also fails. In the last case the server may still be
    /// running and the state stays [`ServerState::Started`].
    pub fn create_database(&mut self) -> Result<()> {
        let _span = info_span!(
            target: LOG_TARGET,
            "create_database",
            db = %self.config.database()
        )
        .entered();
        if !self.is_started() {
            return Err(LifecycleError::NotStarted);
        }

        match self.creator.create(&self.config) {
            Ok(()) => {
                info!(target: LOG_TARGET, "database ready");
                Ok(())
            }
            Err(create) => Err(self.stop_after_failed_create(create)),
        }
    }

    fn stop_after_failed_create(&mut self, create: CreateDatabaseError) -> LifecycleError {
        warn!(
            target: LOG_TARGET,
            error = %create,
            "database creation failed; stopping postgres"
        );
        match self.stop_server() {
            Ok(()) => LifecycleError::CreateDatabase(create),
            Err(stop) => LifecycleError::CreateDatabaseCleanup {
                create: Box::new(create),
                stop: Box::new(stop),
            },
        }
    }

    fn stop_server(&mut self) -> std::result::Result<(), StopError> {
        let extract_dir = self.extraction_dir();
        self.controller.stop(&extract_dir)?;
        self.state = ServerState::Stopped;
        info!(target: LOG_TARGET, path = %extract_dir, "postgres stopped");
        Ok(())
    }

    fn extraction_dir_for(&self, archive: &Utf8Path) -> Utf8PathBuf {
        self.config.runtime_path().map_or_else(
            || {
                archive.parent().map_or_else(
                    || Utf8PathBuf::from(EXTRACTED_DIR_NAME),
                    |parent| parent.join(EXTRACTED_DIR_NAME),
                )
            },
            Utf8Path::to_path_buf,
        )
    }
}

impl fmt::Debug for EmbeddedPostgres {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedPostgres")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for EmbeddedPostgres {
    fn drop(&mut self) {
        if self.is_started() {
            warn!(
                target: LOG_TARGET,
                port = self.config.port(),
                "EmbeddedPostgres dropped while postgres is running; call stop() to shut it down"
            );
        }
    }
}
