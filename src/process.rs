//! Starts and stops the server through the bundled `pg_ctl` utility.
//!
//! `pg_ctl -w` performs its own readiness and shutdown polling, so these
//! calls block until the utility returns. Child output is inherited rather
//! than captured.

use std::process::{Command, ExitStatus, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use tracing::info;

use crate::error::{StartError, StopError};
use crate::observability::PROCESS_LOG_TARGET;

/// Data directory name inside the extraction directory.
pub const DATA_DIR_NAME: &str = "data";

/// Returns `<extract_dir>/bin/<binary>`.
#[must_use]
pub fn binary_path(extract_dir: &Utf8Path, binary: &str) -> Utf8PathBuf {
    extract_dir.join("bin").join(binary)
}

/// Returns `<extract_dir>/data`.
#[must_use]
pub fn data_dir(extract_dir: &Utf8Path) -> Utf8PathBuf {
    extract_dir.join(DATA_DIR_NAME)
}

/// Launches and terminates the server process.
#[cfg_attr(test, mockall::automock)]
pub trait ServerController: Send {
    /// Starts the server rooted at `extract_dir` on `port` and waits until it
    /// accepts connections.
    ///
    /// # Errors
    /// Returns a [`StartError`] when the launch command cannot be spawned or
    /// exits unsuccessfully.
    fn start(&self, extract_dir: &Utf8Path, port: u16) -> Result<(), StartError>;

    /// Stops the server rooted at `extract_dir` and waits for shutdown.
    ///
    /// # Errors
    /// Returns a [`StopError`] when the stop command cannot be spawned or
    /// exits unsuccessfully.
    fn stop(&self, extract_dir: &Utf8Path) -> Result<(), StopError>;
}

/// Default controller invoking `<extract_dir>/bin/pg_ctl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgCtl;

impl PgCtl {
    /// Builds `pg_ctl start -w -D <data> -o "-p <port>"`.
    #[must_use]
    pub fn start_command(extract_dir: &Utf8Path, port: u16) -> Command {
        let mut command = Command::new(binary_path(extract_dir, "pg_ctl").as_std_path());
        command
            .arg("start")
            .arg("-w")
            .arg("-D")
            .arg(data_dir(extract_dir).as_std_path())
            .arg("-o")
            .arg(format!("-p {port}"));
        command
    }

    /// Builds `pg_ctl stop -w -D <data>`.
    #[must_use]
    pub fn stop_command(extract_dir: &Utf8Path) -> Command {
        let mut command = Command::new(binary_path(extract_dir, "pg_ctl").as_std_path());
        command
            .arg("stop")
            .arg("-w")
            .arg("-D")
            .arg(data_dir(extract_dir).as_std_path());
        command
    }
}

impl ServerController for PgCtl {
    fn start(&self, extract_dir: &Utf8Path, port: u16) -> Result<(), StartError> {
        let mut command = Self::start_command(extract_dir, port);
        let rendered = render_command(&command);
        info!(target: PROCESS_LOG_TARGET, command = %rendered, "starting postgres");
        run_with_passthrough(&mut command).map_err(|report| StartError::new(rendered, report))
    }

    fn stop(&self, extract_dir: &Utf8Path) -> Result<(), StopError> {
        let mut command = Self::stop_command(extract_dir);
        let rendered = render_command(&command);
        info!(target: PROCESS_LOG_TARGET, command = %rendered, "stopping postgres");
        run_with_passthrough(&mut command).map_err(|report| StopError::new(rendered, report))
    }
}

fn run_with_passthrough(command: &mut Command) -> color_eyre::Result<()> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|err| eyre!("failed to spawn: {err}"))?;
    check_status(status)
}

fn check_status(status: ExitStatus) -> color_eyre::Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(eyre!("exited with {status}"))
    }
}

/// Renders a command as a space-separated line for logs and errors.
pub(crate) fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| {
            let text = part.to_string_lossy();
            if text.contains(' ') {
                format!("\"{text}\"")
            } else {
                text.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
