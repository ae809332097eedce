//! Creates a fresh data directory with the bundled `initdb`.

use std::process::{Command, Output, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use tracing::info;

use crate::config::Config;
use crate::error::InitError;
use crate::observability::PROCESS_LOG_TARGET;
use crate::process::{binary_path, data_dir, render_command};

const PASSWORD_FILE_NAME: &str = "pwfile";

/// Initialises the data directory inside an extraction directory.
#[cfg_attr(test, mockall::automock)]
pub trait DatabaseInitializer: Send {
    /// Creates `<extract_dir>/data` with the configured superuser, password
    /// and locale.
    ///
    /// # Errors
    /// Returns an [`InitError`] when the initialisation routine fails.
    fn init(&self, extract_dir: &Utf8Path, config: &Config) -> Result<(), InitError>;
}

/// Default initializer running `<extract_dir>/bin/initdb`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitDb;

impl InitDb {
    /// Builds the `initdb` invocation for `extract_dir`.
    #[must_use]
    pub fn command(extract_dir: &Utf8Path, password_file: &Utf8Path, config: &Config) -> Command {
        let mut command = Command::new(binary_path(extract_dir, "initdb").as_std_path());
        command
            .arg("-A")
            .arg("password")
            .arg("-U")
            .arg(config.username())
            .arg("-D")
            .arg(data_dir(extract_dir).as_std_path())
            .arg(format!("--pwfile={password_file}"));
        if let Some(locale) = config.locale().filter(|locale| !locale.is_empty()) {
            command.arg(format!("--locale={locale}"));
        }
        command
    }
}

impl DatabaseInitializer for InitDb {
    fn init(&self, extract_dir: &Utf8Path, config: &Config) -> Result<(), InitError> {
        let password_file = write_password_file(extract_dir, config.password())?;
        let mut command = Self::command(extract_dir, &password_file, config);
        let rendered = render_command(&command);
        info!(target: PROCESS_LOG_TARGET, command = %rendered, "initialising data directory");

        let result = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("unable to spawn {rendered}"))
            .map_err(InitError::from)
            .and_then(|output| check_output(&rendered, &output));

        // The password file only needs to outlive initdb.
        drop(std::fs::remove_file(&password_file));
        result
    }
}

fn write_password_file(extract_dir: &Utf8Path, password: &str) -> Result<Utf8PathBuf, InitError> {
    let path = extract_dir.join(PASSWORD_FILE_NAME);
    std::fs::write(&path, password)
        .with_context(|| format!("unable to write password to file {path}"))
        .map_err(InitError::from)?;
    #[cfg(unix)]
    crate::fs::set_permissions(&path, 0o600).map_err(InitError::from)?;
    Ok(path)
}

fn check_output(rendered: &str, output: &Output) -> Result<(), InitError> {
    if output.status.success() {
        return Ok(());
    }
    Err(InitError::from(eyre!(
        "unable to init database using {rendered}\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_includes_credentials_and_data_dir() {
        let config = Config::default().with_username("pg");
        let command = InitDb::command(
            Utf8Path::new("/opt/pg"),
            Utf8Path::new("/opt/pg/pwfile"),
            &config,
        );

        assert_eq!(command.get_program(), OsStr::new("/opt/pg/bin/initdb"));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(
            args,
            [
                "-A",
                "password",
                "-U",
                "pg",
                "-D",
                "/opt/pg/data",
                "--pwfile=/opt/pg/pwfile"
            ]
        );
    }

    #[test]
    fn command_appends_locale_when_configured() {
        let config = Config::default().with_locale("C");
        let command = InitDb::command(
            Utf8Path::new("/opt/pg"),
            Utf8Path::new("/opt/pg/pwfile"),
            &config,
        );

        assert_eq!(command.get_args().last(), Some(OsStr::new("--locale=C")));
    }

    #[test]
    fn missing_initdb_fails_and_removes_password_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let extract_dir = Utf8Path::from_path(temp.path()).expect("utf8 path");

        let err = InitDb
            .init(extract_dir, &Config::default())
            .expect_err("missing initdb should fail");

        assert!(err.to_string().contains("unable to spawn"), "{err}");
        assert!(!extract_dir.join(PASSWORD_FILE_NAME).exists());
    }
}
