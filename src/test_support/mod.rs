//! Helpers re-exported for unit and integration tests.
//!
//! The fake distribution mirrors the layout of a real binaries archive, with
//! `pg_ctl` and `initdb` replaced by shell scripts that record their
//! arguments. It lets the lifecycle run end to end without a network or a
//! real server.

mod distribution;
mod doubles;
mod logging;

pub use distribution::{
    CALLS_LOG, FakeFetcher, fake_distribution_txz, fail_marker, read_calls, txz_bytes, write_txz,
};
pub use doubles::{FailingCreator, RecordingCreator};
pub use logging::capture_logs;
