//! Immutable server configuration consumed by [`crate::EmbeddedPostgres`].

use std::borrow::Cow;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, ConfigResult};

/// Repository hosting the `io.zonky.test.postgres` binary artifacts.
pub const DEFAULT_REPOSITORY_URL: &str = "https://repo1.maven.org";

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_CREDENTIAL: &str = "postgres";

/// Version of the `PostgreSQL` distribution to install.
///
/// The named constants match the distributions published by the default
/// repository. Any other version string can be supplied via
/// [`PostgresVersion::new`].
///
/// # Examples
/// ```
/// use pg_embedded_lifecycle::PostgresVersion;
///
/// assert_eq!(PostgresVersion::V12.as_str(), "12.1.0");
/// assert_eq!(PostgresVersion::new("13.2.0").as_str(), "13.2.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostgresVersion(Cow<'static, str>);

impl PostgresVersion {
    /// `PostgreSQL` 12.
    pub const V12: Self = Self(Cow::Borrowed("12.1.0"));
    /// `PostgreSQL` 11.
    pub const V11: Self = Self(Cow::Borrowed("11.6.0"));
    /// `PostgreSQL` 10.
    pub const V10: Self = Self(Cow::Borrowed("10.11.0"));
    /// `PostgreSQL` 9.6.
    pub const V9: Self = Self(Cow::Borrowed("9.6.16"));

    /// Wraps an arbitrary version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(Cow::Owned(version.into()))
    }

    /// Returns the version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PostgresVersion {
    fn default() -> Self {
        Self::V12
    }
}

impl fmt::Display for PostgresVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired configuration of the embedded server.
///
/// Built once with the consuming setters below and handed to
/// [`crate::EmbeddedPostgres::new`], which keeps it for the lifetime of the
/// lifecycle object.
///
/// # Examples
/// ```
/// use pg_embedded_lifecycle::{Config, PostgresVersion};
///
/// let config = Config::default()
///     .with_port(15432)
///     .with_username("pg")
///     .with_password("pw")
///     .with_database("testdb")
///     .with_version(PostgresVersion::V11);
/// assert_eq!(config.port(), 15432);
/// assert_eq!(config.database(), "testdb");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    version: PostgresVersion,
    port: u16,
    username: String,
    password: SecretString,
    database: String,
    locale: Option<String>,
    runtime_path: Option<Utf8PathBuf>,
    cache_dir: Option<Utf8PathBuf>,
    repository_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: PostgresVersion::default(),
            port: DEFAULT_PORT,
            username: DEFAULT_CREDENTIAL.to_owned(),
            password: SecretString::from(DEFAULT_CREDENTIAL.to_owned()),
            database: DEFAULT_CREDENTIAL.to_owned(),
            locale: None,
            runtime_path: None,
            cache_dir: None,
            repository_url: DEFAULT_REPOSITORY_URL.to_owned(),
        }
    }
}

impl Config {
    /// Sets the `PostgreSQL` version to install.
    #[must_use]
    pub fn with_version(mut self, version: PostgresVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the TCP port the server listens on.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the bootstrap superuser name.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the bootstrap superuser password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(password.into());
        self
    }

    /// Sets the database created by
    /// [`crate::EmbeddedPostgres::create_database`].
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the locale passed to `initdb`.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Extracts the binaries into `path` instead of next to the cache.
    #[must_use]
    pub fn with_runtime_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.runtime_path = Some(path.into());
        self
    }

    /// Stores downloaded archives in `dir` instead of the resolved cache
    /// directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Downloads artifacts from `url` instead of [`DEFAULT_REPOSITORY_URL`].
    #[must_use]
    pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = url.into();
        self
    }

    /// Returns the configured version.
    #[must_use]
    pub const fn version(&self) -> &PostgresVersion {
        &self.version
    }

    /// Returns the configured port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the bootstrap superuser name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the bootstrap superuser password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the name of the database to create.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the configured `initdb` locale, if any.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Returns the user-supplied extraction directory, if any.
    #[must_use]
    pub fn runtime_path(&self) -> Option<&Utf8Path> {
        self.runtime_path.as_deref()
    }

    /// Returns the user-supplied cache directory, if any.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Utf8Path> {
        self.cache_dir.as_deref()
    }

    /// Returns the repository base URL.
    #[must_use]
    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// Rejects configurations the server cannot run with.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the port is zero or the username,
    /// database name or version is empty.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::from(eyre!("port must be between 1 and 65535")));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::from(eyre!("username must not be empty")));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::from(eyre!("database name must not be empty")));
        }
        if self.version.as_str().trim().is_empty() {
            return Err(ConfigError::from(eyre!("version must not be empty")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_match_stock_postgres_credentials() {
        let config = Config::default();
        assert_eq!(config.port(), 5432);
        assert_eq!(config.username(), "postgres");
        assert_eq!(config.password(), "postgres");
        assert_eq!(config.database(), "postgres");
        assert_eq!(config.version(), &PostgresVersion::V12);
        assert_eq!(config.repository_url(), DEFAULT_REPOSITORY_URL);
        assert!(config.locale().is_none());
        assert!(config.runtime_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = Config::default().with_password("hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"), "password leaked: {rendered}");
    }

    #[rstest]
    #[case::zero_port(Config::default().with_port(0), "port")]
    #[case::blank_username(Config::default().with_username("  "), "username")]
    #[case::blank_database(Config::default().with_database(""), "database")]
    #[case::blank_version(Config::default().with_version(PostgresVersion::new("")), "version")]
    fn validate_rejects_unusable_values(#[case] config: Config, #[case] needle: &str) {
        let err = config.validate().expect_err("config should be rejected");
        assert!(err.to_string().contains(needle), "unexpected error: {err}");
    }
}
