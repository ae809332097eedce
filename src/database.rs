//! Issues `CREATE DATABASE` against the running server.

use color_eyre::eyre::WrapErr;
use postgres::{Client, Config as ClientConfig, NoTls};
use tracing::{debug, info_span};

use crate::config::Config;
use crate::error::CreateDatabaseError;
use crate::observability::LOG_TARGET;

/// Maintenance database every cluster ships with.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Creates the configured database on a running server.
#[cfg_attr(test, mockall::automock)]
pub trait DatabaseCreator: Send {
    /// Creates `config.database()` on the server listening on
    /// `config.port()`.
    ///
    /// # Errors
    /// Returns a [`CreateDatabaseError`] when the connection or the statement
    /// fails.
    fn create(&self, config: &Config) -> Result<(), CreateDatabaseError>;
}

/// Default creator using the synchronous `postgres` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDatabaseCreator;

impl PostgresDatabaseCreator {
    fn admin_client(config: &Config) -> Result<Client, CreateDatabaseError> {
        ClientConfig::new()
            .host("localhost")
            .port(config.port())
            .user(config.username())
            .password(config.password())
            .dbname(MAINTENANCE_DATABASE)
            .connect(NoTls)
            .wrap_err_with(|| {
                format!(
                    "unable to connect to create database with custom name {}",
                    config.database()
                )
            })
            .map_err(CreateDatabaseError::from)
    }
}

impl DatabaseCreator for PostgresDatabaseCreator {
    fn create(&self, config: &Config) -> Result<(), CreateDatabaseError> {
        let name = config.database();
        let _span = info_span!(target: LOG_TARGET, "create_database", db = %name).entered();
        if name == MAINTENANCE_DATABASE {
            debug!(target: LOG_TARGET, "maintenance database already exists");
            return Ok(());
        }

        let mut client = Self::admin_client(config)?;
        client
            .batch_execute(&create_database_statement(name))
            .wrap_err_with(|| format!("failed to create database '{name}'"))
            .map_err(CreateDatabaseError::from)
    }
}

/// Builds `CREATE DATABASE "<name>"` with the identifier escaped.
#[must_use]
pub fn create_database_statement(name: &str) -> String {
    format!("CREATE DATABASE \"{}\"", escape_identifier(name))
}

/// Doubles embedded quotes so `name` is safe inside a quoted identifier.
#[must_use]
pub fn escape_identifier(name: &str) -> String {
    name.replace('"', "\"\"")
}
