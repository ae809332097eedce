//! Downloads the configured `PostgreSQL` distribution, extracts it and
//! initialises the data directory.
//!
//! The server is **not** started. Configuration is read from `PG_*`
//! environment variables; logging honours `RUST_LOG`. The binary exits with
//! status code `0` on success and `1` on error.

use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    pg_embedded_lifecycle::run().map_err(|err| color_eyre::eyre::eyre!(err))?;
    Ok(())
}
