//! Runs a transient `PostgreSQL` server for tests and local development.
//!
//! [`EmbeddedPostgres`] downloads a binary distribution into a local cache,
//! extracts it, initialises a data directory, starts and stops the server
//! through `pg_ctl`, and creates the configured database. Each step sits
//! behind a small trait so tests can replace it.
//!
//! The lifecycle is `install → start → create_database → stop`:
//!
//! ```no_run
//! use pg_embedded_lifecycle::{Config, EmbeddedPostgres};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut postgres = EmbeddedPostgres::new(Config::default().with_port(15432))?;
//! postgres.install()?;
//! postgres.start()?;
//! postgres.create_database()?;
//! postgres.stop()?;
//! # Ok(())
//! # }
//! ```

mod archive;
pub mod cache;
mod config;
mod database;
mod error;
pub mod fetch;
mod fs;
mod init;
mod lifecycle;
mod observability;
mod platform;
mod port;
mod process;
#[doc(hidden)]
pub mod test_support;

pub use archive::extract_txz;
pub use config::{Config, DEFAULT_REPOSITORY_URL, PostgresVersion};
pub use database::{DatabaseCreator, PostgresDatabaseCreator, escape_identifier};
pub use error::{
    ConfigError, ConfigResult, CreateDatabaseError, ExtractError, FetchError, FetchErrorKind,
    InitError, LifecycleError, PortUnavailableError, Result, StartError, StopError,
};
pub use fetch::{MavenFetcher, RemoteFetcher};
pub use init::{DatabaseInitializer, InitDb};
pub use lifecycle::{EXTRACTED_DIR_NAME, EmbeddedPostgres, EmbeddedPostgresBuilder, ServerState};
pub use platform::BinaryArtifact;
pub use port::ensure_port_available;
pub use process::{PgCtl, ServerController};

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use tracing::info;

use crate::observability::LOG_TARGET;

/// Captures server settings supplied via `PG_*` environment variables.
///
/// # Examples
/// ```
/// use pg_embedded_lifecycle::PgEnvCfg;
///
/// let cfg = PgEnvCfg::default();
/// assert!(cfg.port.is_none());
/// ```
#[derive(Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "PG")]
pub struct PgEnvCfg {
    /// Distribution version, for example `12.1.0`. Read from `PG_VERSION`.
    #[ortho_config(cli_long = "pg-version")]
    pub version: Option<String>,
    /// Port assigned to the server.
    pub port: Option<u16>,
    /// Name of the bootstrap superuser.
    pub superuser: Option<String>,
    /// Password provisioned for the superuser.
    pub password: Option<String>,
    /// Database created by `create_database`.
    pub database: Option<String>,
    /// Locale passed to `initdb`.
    pub locale: Option<String>,
    /// Directory the binaries are extracted into.
    pub runtime_dir: Option<Utf8PathBuf>,
    /// Directory holding downloaded archives.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Base URL of the artifact repository.
    pub repository_url: Option<String>,
}

impl fmt::Debug for PgEnvCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgEnvCfg")
            .field("version", &self.version)
            .field("port", &self.port)
            .field("superuser", &self.superuser)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("locale", &self.locale)
            .field("runtime_dir", &self.runtime_dir)
            .field("cache_dir", &self.cache_dir)
            .field("repository_url", &self.repository_url)
            .finish()
    }
}

impl PgEnvCfg {
    /// Loads configuration from environment variables without parsing CLI
    /// arguments.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a variable cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("pg-embedded-lifecycle")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }

    /// Applies the loaded values over [`Config::default`].
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the resulting configuration is invalid.
    pub fn to_config(&self) -> ConfigResult<Config> {
        let mut config = Config::default();
        if let Some(ref version) = self.version {
            config = config.with_version(PostgresVersion::new(version.clone()));
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(ref user) = self.superuser {
            config = config.with_username(user.clone());
        }
        if let Some(ref password) = self.password {
            config = config.with_password(password.clone());
        }
        if let Some(ref database) = self.database {
            config = config.with_database(database.clone());
        }
        if let Some(ref locale) = self.locale {
            config = config.with_locale(locale.clone());
        }
        if let Some(ref dir) = self.runtime_dir {
            config = config.with_runtime_path(dir.clone());
        }
        if let Some(ref dir) = self.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        if let Some(ref url) = self.repository_url {
            config = config.with_repository_url(url.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Installs the distribution described by the `PG_*` environment and leaves
/// the server stopped.
///
/// # Errors
/// Returns a [`LifecycleError`] when configuration loading or any install
/// step fails.
pub fn run() -> Result<()> {
    let config = PgEnvCfg::load()?.to_config()?;
    let mut postgres = EmbeddedPostgres::new(config)?;
    postgres.install()?;
    info!(
        target: LOG_TARGET,
        path = %postgres.extraction_dir(),
        "installation ready; server not started"
    );
    Ok(())
}
