//! Fake binaries archive and a fetcher that serves it.

use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use xz2::write::XzEncoder;

use crate::cache::write_digest;
use crate::error::FetchError;
use crate::fetch::RemoteFetcher;

/// File inside the extraction directory that the fake tools append their
/// command lines to.
pub const CALLS_LOG: &str = "calls.log";

const PG_CTL_SCRIPT: &str = r#"#!/bin/sh
root=$(cd "$(dirname "$0")/.." && pwd)
echo "pg_ctl $*" >> "$root/calls.log"
action=$1
if [ -e "$root/fail-$action" ]; then
    echo "pg_ctl: simulated $action failure" >&2
    exit 1
fi
data=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-D" ]; then
        shift
        data=$1
    fi
    shift
done
if [ "$action" = "start" ] && [ ! -f "$data/PG_VERSION" ]; then
    echo "pg_ctl: directory \"$data\" is not a database cluster directory" >&2
    exit 1
fi
exit 0
"#;

const INITDB_SCRIPT: &str = r#"#!/bin/sh
root=$(cd "$(dirname "$0")/.." && pwd)
echo "initdb $*" >> "$root/calls.log"
while [ $# -gt 0 ]; do
    case "$1" in
        -D)
            shift
            mkdir -p "$1" && echo 12 > "$1/PG_VERSION"
            ;;
        --pwfile=*)
            if [ ! -f "${1#--pwfile=}" ]; then
                echo "initdb: password file missing" >&2
                exit 1
            fi
            ;;
    esac
    shift
done
"#;

/// Packs `entries` into an in-memory `tar.xz` archive. Every entry is
/// written with mode `0755`.
///
/// # Errors
/// Returns an error when an entry cannot be appended or the stream cannot be
/// finished.
pub fn txz_bytes(entries: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(XzEncoder::new(Vec::new(), 6));
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(u64::try_from(contents.len()).map_err(io::Error::other)?);
        header.set_mode(0o755);
        builder.append_data(&mut header, name, *contents)?;
    }
    builder.into_inner()?.finish()
}

/// Writes a `tar.xz` archive holding `entries` to `path`.
///
/// # Errors
/// Returns an error when the archive cannot be built or written.
pub fn write_txz(path: &Utf8Path, entries: &[(&str, &[u8])]) -> io::Result<()> {
    let bytes = txz_bytes(entries)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()
}

/// Builds an archive laid out like a binaries distribution whose `pg_ctl`
/// and `initdb` are recording shell scripts.
///
/// # Errors
/// Returns an error when the archive cannot be built.
pub fn fake_distribution_txz() -> io::Result<Vec<u8>> {
    txz_bytes(&[
        ("bin/pg_ctl", PG_CTL_SCRIPT.as_bytes()),
        ("bin/initdb", INITDB_SCRIPT.as_bytes()),
        ("share/postgresql.conf.sample", b"# sample\n"),
    ])
}

/// Returns the marker path that makes the fake `pg_ctl <action>` fail.
#[must_use]
pub fn fail_marker(extract_dir: &Utf8Path, action: &str) -> Utf8PathBuf {
    extract_dir.join(format!("fail-{action}"))
}

/// Reads the command lines recorded by the fake tools.
///
/// # Errors
/// Returns an error when the log exists but cannot be read.
pub fn read_calls(extract_dir: &Utf8Path) -> io::Result<Vec<String>> {
    match std::fs::read_to_string(extract_dir.join(CALLS_LOG)) {
        Ok(contents) => Ok(contents.lines().map(str::to_owned).collect()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

/// Fetcher that writes a prepared archive and counts its invocations.
///
/// Clones share the counter, so a test can keep one clone while the
/// lifecycle owns another.
#[derive(Debug, Clone)]
pub struct FakeFetcher {
    archive: Arc<Vec<u8>>,
    fetches: Arc<AtomicUsize>,
}

impl FakeFetcher {
    /// Serves [`fake_distribution_txz`].
    ///
    /// # Errors
    /// Returns an error when the archive cannot be built.
    pub fn new() -> io::Result<Self> {
        Ok(Self::with_archive(fake_distribution_txz()?))
    }

    /// Serves `archive` verbatim.
    #[must_use]
    pub fn with_archive(archive: Vec<u8>) -> Self {
        Self {
            archive: Arc::new(archive),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of completed `fetch` calls across all clones.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RemoteFetcher for FakeFetcher {
    fn fetch(&self, destination: &Utf8Path) -> Result<(), FetchError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache directory {parent}"))?;
        }
        std::fs::write(destination, self.archive.as_slice())
            .with_context(|| format!("write archive {destination}"))?;
        write_digest(destination)?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
