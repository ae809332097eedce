//! Builder for [`EmbeddedPostgres`] with replaceable collaborators.

use super::{EmbeddedPostgres, ServerState};
use crate::cache::{ArchiveCacheLocator, CacheLocator};
use crate::config::Config;
use crate::database::{DatabaseCreator, PostgresDatabaseCreator};
use crate::error::ConfigResult;
use crate::fetch::{MavenFetcher, RemoteFetcher};
use crate::init::{DatabaseInitializer, InitDb};
use crate::process::{PgCtl, ServerController};

/// Assembles an [`EmbeddedPostgres`].
///
/// Collaborators left unset fall back to [`ArchiveCacheLocator`],
/// [`MavenFetcher`], [`InitDb`], [`PgCtl`] and [`PostgresDatabaseCreator`].
#[must_use]
pub struct EmbeddedPostgresBuilder {
    config: Config,
    locator: Option<Box<dyn CacheLocator>>,
    fetcher: Option<Box<dyn RemoteFetcher>>,
    initializer: Option<Box<dyn DatabaseInitializer>>,
    controller: Option<Box<dyn ServerController>>,
    creator: Option<Box<dyn DatabaseCreator>>,
}

impl EmbeddedPostgresBuilder {
    /// Starts a builder for `config`.
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            locator: None,
            fetcher: None,
            initializer: None,
            controller: None,
            creator: None,
        }
    }

    /// Replaces the cache locator.
    pub fn cache_locator(mut self, locator: impl CacheLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Replaces the remote fetcher.
    pub fn fetcher(mut self, fetcher: impl RemoteFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Replaces the data directory initializer.
    pub fn initializer(mut self, initializer: impl DatabaseInitializer + 'static) -> Self {
        self.initializer = Some(Box::new(initializer));
        self
    }

    /// Replaces the process controller.
    pub fn controller(mut self, controller: impl ServerController + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    /// Replaces the database creator.
    pub fn database_creator(mut self, creator: impl DatabaseCreator + 'static) -> Self {
        self.creator = Some(Box::new(creator));
        self
    }

    /// Validates the configuration and builds the lifecycle in the
    /// [`ServerState::Stopped`] state.
    ///
    /// # Errors
    /// Returns a [`crate::ConfigError`] when the configuration is invalid.
    pub fn build(self) -> ConfigResult<EmbeddedPostgres> {
        self.config.validate()?;
        let Self {
            config,
            locator,
            fetcher,
            initializer,
            controller,
            creator,
        } = self;

        Ok(EmbeddedPostgres {
            locator: locator.unwrap_or_else(|| Box::new(ArchiveCacheLocator::from_config(&config))),
            fetcher: fetcher.unwrap_or_else(|| Box::new(MavenFetcher::from_config(&config))),
            initializer: initializer.unwrap_or_else(|| Box::new(InitDb)),
            controller: controller.unwrap_or_else(|| Box::new(PgCtl)),
            creator: creator.unwrap_or_else(|| Box::new(PostgresDatabaseCreator)),
            config,
            state: ServerState::Stopped,
        })
    }
}
