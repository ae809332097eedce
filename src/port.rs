//! Pre-start check that the configured TCP port is free.
//!
//! The check is advisory: another process can still claim the port between
//! this probe and the server binding it.

use std::io::{self, ErrorKind};
use std::net::{TcpListener, ToSocketAddrs};

use tracing::debug;

use crate::error::PortUnavailableError;
use crate::observability::LOG_TARGET;

/// Binds `localhost:<port>` on every address `localhost` resolves to and
/// releases the listeners immediately.
///
/// # Errors
/// Returns a [`PortUnavailableError`] when any address reports the port in
/// use, or when no address could be bound at all.
pub fn ensure_port_available(port: u16) -> Result<(), PortUnavailableError> {
    let addresses = ("localhost", port)
        .to_socket_addrs()
        .map_err(|source| PortUnavailableError { port, source })?;

    let mut bound_any = false;
    let mut last_error = None;
    for address in addresses {
        match TcpListener::bind(address) {
            Ok(listener) => {
                bound_any = true;
                drop(listener);
            }
            Err(source) if source.kind() == ErrorKind::AddrInUse => {
                debug!(target: LOG_TARGET, %address, "port already bound");
                return Err(PortUnavailableError { port, source });
            }
            Err(source) => {
                debug!(target: LOG_TARGET, %address, error = %source, "address not bindable");
                last_error = Some(source);
            }
        }
    }

    if bound_any {
        Ok(())
    } else {
        Err(PortUnavailableError {
            port,
            source: last_error.unwrap_or_else(|| {
                io::Error::new(ErrorKind::AddrNotAvailable, "localhost did not resolve")
            }),
        })
    }
}
