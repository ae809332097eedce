//! Domain error types for the embedded `PostgreSQL` lifecycle.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for lifecycle operations that may return a [`LifecycleError`].
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error returned by [`crate::EmbeddedPostgres`] operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The supplied configuration is invalid.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    /// Downloading the binary archive failed.
    #[error("failed to fetch postgres binaries")]
    Fetch(#[from] FetchError),
    /// Unpacking the binary archive failed.
    #[error("failed to extract postgres binaries")]
    Extract(#[from] ExtractError),
    /// Initialising the data directory failed.
    #[error("failed to initialise the postgres data directory")]
    Init(#[from] InitError),
    /// Another process already listens on the configured port.
    #[error(transparent)]
    PortUnavailable(#[from] PortUnavailableError),
    /// The server could not be started.
    #[error(transparent)]
    Start(#[from] StartError),
    /// The server could not be stopped.
    #[error(transparent)]
    Stop(#[from] StopError),
    /// The operation requires a started server.
    #[error("server has not been started")]
    NotStarted,
    /// `start` was called while the server was already running.
    #[error("server is already started")]
    AlreadyStarted,
    /// Creating the configured database failed; the server was stopped.
    #[error(transparent)]
    CreateDatabase(#[from] CreateDatabaseError),
    /// Creating the database failed and stopping the server afterwards also
    /// failed. The server may still be running.
    #[error("{create}; stopping the server afterwards also failed: {stop}")]
    CreateDatabaseCleanup {
        /// The original creation failure.
        #[source]
        create: Box<CreateDatabaseError>,
        /// The failure raised by the compensating stop.
        stop: Box<StopError>,
    },
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);

/// Categorises fetch failures so callers can branch on structured errors.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum FetchErrorKind {
    /// Represents errors without a more specific semantic meaning.
    #[default]
    Other,
    /// The repository could not be reached.
    Network,
    /// The repository has no artifact for the requested version.
    NotFound,
    /// The repository answered with an unexpected HTTP status.
    Status,
    /// The downloaded artifact does not contain a binary archive.
    MissingArchive,
    /// Writing the archive into the cache failed.
    Write,
}

/// Captures download failures.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct FetchError {
    kind: FetchErrorKind,
    #[source]
    report: Report,
}

impl FetchError {
    /// Constructs a new fetch error with the provided kind and diagnostic
    /// report.
    #[must_use]
    pub const fn new(kind: FetchErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the semantic category for this fetch failure.
    #[must_use]
    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for FetchError {
    fn from(report: Report) -> Self {
        Self::new(FetchErrorKind::Other, report)
    }
}

/// Captures archive extraction failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ExtractError(#[from] Report);

/// Captures `initdb` failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct InitError(#[from] Report);

/// Captures `CREATE DATABASE` failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct CreateDatabaseError(#[from] Report);

/// Raised when the configured port is already bound by another listener.
#[derive(Debug, Error)]
#[error("process already listening on port {port}")]
pub struct PortUnavailableError {
    /// The port that could not be bound.
    pub port: u16,
    /// The bind failure reported by the operating system.
    #[source]
    pub source: std::io::Error,
}

/// Raised when `pg_ctl start` fails to spawn or exits unsuccessfully.
#[derive(Debug, Error)]
#[error("could not start postgres using {command}")]
pub struct StartError {
    /// The command line that was invoked.
    pub command: String,
    #[source]
    report: Report,
}

impl StartError {
    /// Constructs a start error for `command` with the provided cause.
    #[must_use]
    pub const fn new(command: String, report: Report) -> Self {
        Self { command, report }
    }
}

/// Raised when `pg_ctl stop` fails to spawn or exits unsuccessfully.
#[derive(Debug, Error)]
#[error("could not stop postgres using {command}")]
pub struct StopError {
    /// The command line that was invoked.
    pub command: String,
    #[source]
    report: Report,
}

impl StopError {
    /// Constructs a stop error for `command` with the provided cause.
    #[must_use]
    pub const fn new(command: String, report: Report) -> Self {
        Self { command, report }
    }
}
