//! State machine tests driven through mocked collaborators.

use std::net::TcpListener;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::eyre;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tracing::Level;

use super::*;
use crate::cache::{MockCacheLocator, digest_path, write_digest};
use crate::database::MockDatabaseCreator;
use crate::error::{FetchError, FetchErrorKind, InitError, StartError};
use crate::fetch::MockRemoteFetcher;
use crate::init::MockDatabaseInitializer;
use crate::process::MockServerController;
use crate::test_support::{capture_logs, fake_distribution_txz};

struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    fn archive_path(&self) -> Utf8PathBuf {
        self.root.join("cache").join("pg.txz")
    }

    fn extraction_dir(&self) -> Utf8PathBuf {
        self.root.join("cache").join(EXTRACTED_DIR_NAME)
    }

    fn seed_archive(&self) {
        let archive = self.archive_path();
        std::fs::create_dir_all(archive.parent().expect("archive parent")).expect("cache dir");
        std::fs::write(&archive, fake_distribution_txz().expect("build archive"))
            .expect("seed archive");
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
    Sandbox { _temp: temp, root }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn locator_at(path: Utf8PathBuf) -> MockCacheLocator {
    let mut locator = MockCacheLocator::new();
    locator
        .expect_locate()
        .returning(move || CacheEntry::probe(path.clone()));
    locator
}

struct Mocks {
    locator: MockCacheLocator,
    fetcher: MockRemoteFetcher,
    initializer: MockDatabaseInitializer,
    controller: MockServerController,
    creator: MockDatabaseCreator,
}

impl Mocks {
    fn new(archive: Utf8PathBuf) -> Self {
        Self {
            locator: locator_at(archive),
            fetcher: MockRemoteFetcher::new(),
            initializer: MockDatabaseInitializer::new(),
            controller: MockServerController::new(),
            creator: MockDatabaseCreator::new(),
        }
    }

    fn build(self, config: Config) -> EmbeddedPostgres {
        EmbeddedPostgres::builder(config)
            .cache_locator(self.locator)
            .fetcher(self.fetcher)
            .initializer(self.initializer)
            .controller(self.controller)
            .database_creator(self.creator)
            .build()
            .expect("valid config")
    }
}

fn started(mut mocks: Mocks, port: u16) -> EmbeddedPostgres {
    mocks.controller.expect_start().times(1).returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default().with_port(port));
    postgres.start().expect("start");
    postgres
}

fn stop_error() -> StopError {
    StopError::new("pg_ctl stop".to_owned(), eyre!("exited with 1"))
}

#[test]
fn new_rejects_invalid_config() {
    let err = EmbeddedPostgres::new(Config::default().with_port(0)).expect_err("port 0");
    assert!(err.to_string().contains("port"), "{err}");
}

#[rstest]
fn fresh_lifecycle_is_stopped(sandbox: Sandbox) {
    let postgres = Mocks::new(sandbox.archive_path()).build(Config::default());
    assert!(!postgres.is_started());
    assert_eq!(postgres.state(), ServerState::Stopped);
}

#[rstest]
fn extraction_dir_defaults_to_sibling_of_archive(sandbox: Sandbox) {
    let postgres = Mocks::new(sandbox.archive_path()).build(Config::default());
    assert_eq!(postgres.extraction_dir(), sandbox.extraction_dir());
    assert_eq!(postgres.data_dir(), sandbox.extraction_dir().join("data"));
}

#[rstest]
fn extraction_dir_prefers_runtime_path(sandbox: Sandbox) {
    let runtime = sandbox.root.join("runtime");
    let postgres = Mocks::new(sandbox.archive_path())
        .build(Config::default().with_runtime_path(runtime.clone()));
    assert_eq!(postgres.extraction_dir(), runtime);
}

#[rstest]
fn start_twice_reports_already_started(sandbox: Sandbox) {
    let mut postgres = started(Mocks::new(sandbox.archive_path()), free_port());

    let err = postgres.start().expect_err("second start");

    assert!(matches!(err, LifecycleError::AlreadyStarted), "{err:?}");
    assert!(postgres.is_started());
}

#[rstest]
fn start_passes_extraction_dir_and_port(sandbox: Sandbox) {
    let port = free_port();
    let expected_dir = sandbox.extraction_dir();
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .controller
        .expect_start()
        .withf(move |dir, actual_port| dir.as_str() == expected_dir.as_str() && *actual_port == port)
        .times(1)
        .returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default().with_port(port));

    postgres.start().expect("start");

    assert!(postgres.is_started());
}

#[rstest]
fn failed_start_leaves_server_stopped(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.controller.expect_start().times(1).returning(|_, _| {
        Err(StartError::new(
            "pg_ctl start".to_owned(),
            eyre!("exited with 1"),
        ))
    });
    let mut postgres = mocks.build(Config::default().with_port(free_port()));

    let err = postgres.start().expect_err("start fails");

    assert!(matches!(err, LifecycleError::Start(_)), "{err:?}");
    assert!(!postgres.is_started());
}

#[rstest]
fn busy_port_fails_before_spawning(sandbox: Sandbox) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.controller.expect_start().times(0);
    let mut postgres = mocks.build(Config::default().with_port(port));

    let err = postgres.start().expect_err("port is busy");

    assert!(
        matches!(err, LifecycleError::PortUnavailable(ref inner) if inner.port == port),
        "{err:?}"
    );
    assert!(!postgres.is_started());
}

#[rstest]
fn stop_before_start_reports_not_started(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.controller.expect_stop().times(0);
    let mut postgres = mocks.build(Config::default());

    let err = postgres.stop().expect_err("not started");

    assert!(matches!(err, LifecycleError::NotStarted), "{err:?}");
}

#[rstest]
fn create_database_before_start_reports_not_started(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.creator.expect_create().times(0);
    let mut postgres = mocks.build(Config::default());

    let err = postgres.create_database().expect_err("not started");

    assert!(matches!(err, LifecycleError::NotStarted), "{err:?}");
}

#[rstest]
fn stop_returns_to_stopped(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.controller.expect_stop().times(1).returning(|_| Ok(()));
    let mut postgres = started(mocks, free_port());

    postgres.stop().expect("stop");

    assert!(!postgres.is_started());
}

#[rstest]
fn stop_does_not_need_cached_archive(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    let expected = sandbox.extraction_dir();
    mocks
        .controller
        .expect_stop()
        .withf(move |dir| dir.as_str() == expected.as_str())
        .times(1)
        .returning(|_| Ok(()));
    let mut postgres = started(mocks, free_port());
    assert!(!postgres.cache_entry().exists);

    postgres.stop().expect("stop without archive");

    assert!(!postgres.is_started());
}

#[rstest]
fn failed_stop_keeps_server_started(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .controller
        .expect_stop()
        .times(1)
        .returning(|_| Err(stop_error()));
    let mut postgres = started(mocks, free_port());

    let err = postgres.stop().expect_err("stop fails");

    assert!(matches!(err, LifecycleError::Stop(_)), "{err:?}");
    assert!(postgres.is_started());
}

#[rstest]
fn create_database_delegates_with_config(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .creator
        .expect_create()
        .withf(|config| config.database() == "postgres")
        .times(1)
        .returning(|_| Ok(()));
    let mut postgres = started(mocks, free_port());

    postgres.create_database().expect("create");

    assert!(postgres.is_started());
}

#[rstest]
fn failed_create_stops_server(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .creator
        .expect_create()
        .times(1)
        .returning(|_| Err(CreateDatabaseError::from(eyre!("permission denied"))));
    mocks.controller.expect_stop().times(1).returning(|_| Ok(()));
    let mut postgres = started(mocks, free_port());

    let err = postgres.create_database().expect_err("create fails");

    assert!(matches!(err, LifecycleError::CreateDatabase(_)), "{err:?}");
    assert!(err.to_string().contains("permission denied"), "{err}");
    assert!(!postgres.is_started());
}

#[rstest]
fn failed_create_and_stop_reports_both(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .creator
        .expect_create()
        .times(1)
        .returning(|_| Err(CreateDatabaseError::from(eyre!("permission denied"))));
    mocks
        .controller
        .expect_stop()
        .times(1)
        .returning(|_| Err(stop_error()));
    let mut postgres = started(mocks, free_port());

    let err = postgres.create_database().expect_err("create fails");

    let message = err.to_string();
    assert!(
        matches!(err, LifecycleError::CreateDatabaseCleanup { .. }),
        "{err:?}"
    );
    assert!(message.contains("permission denied"), "{message}");
    assert!(message.contains("pg_ctl stop"), "{message}");
    assert!(postgres.is_started());
}

#[rstest]
fn install_fetches_missing_archive_then_extracts_and_initialises(sandbox: Sandbox) {
    let archive = sandbox.archive_path();
    let extract_dir = sandbox.extraction_dir();
    let expected_archive = archive.clone();
    let mut mocks = Mocks::new(archive);
    mocks
        .fetcher
        .expect_fetch()
        .withf(move |destination| destination.as_str() == expected_archive.as_str())
        .times(1)
        .returning(|destination: &Utf8Path| {
            std::fs::create_dir_all(destination.parent().expect("parent")).expect("cache dir");
            std::fs::write(destination, fake_distribution_txz().expect("archive"))
                .expect("write archive");
            Ok(())
        });
    let expected_dir = extract_dir.clone();
    mocks
        .initializer
        .expect_init()
        .withf(move |dir, _| dir.as_str() == expected_dir.as_str())
        .times(1)
        .returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default());

    postgres.install().expect("install");

    assert!(extract_dir.join("bin/pg_ctl").is_file());
    assert!(!postgres.is_started());
}

#[rstest]
fn install_reuses_cached_archive(sandbox: Sandbox) {
    sandbox.seed_archive();
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.fetcher.expect_fetch().times(0);
    mocks.initializer.expect_init().times(2).returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default());

    postgres.install().expect("first install");
    postgres.install().expect("second install");
}

#[rstest]
fn install_refetches_archive_with_mismatched_digest(sandbox: Sandbox) {
    sandbox.seed_archive();
    let archive = sandbox.archive_path();
    write_digest(&archive).expect("record digest");
    std::fs::write(&archive, b"corrupted").expect("corrupt archive");

    let mut mocks = Mocks::new(archive.clone());
    mocks
        .fetcher
        .expect_fetch()
        .times(1)
        .returning(|destination: &Utf8Path| {
            assert!(!destination.exists(), "stale archive should be removed first");
            std::fs::write(destination, fake_distribution_txz().expect("archive"))
                .expect("write archive");
            Ok(())
        });
    mocks.initializer.expect_init().times(1).returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default());

    postgres.install().expect("install");

    assert!(!digest_path(&archive).exists());
    assert!(sandbox.extraction_dir().join("bin/initdb").is_file());
}

#[rstest]
fn install_wipes_previous_extraction(sandbox: Sandbox) {
    sandbox.seed_archive();
    let stale = sandbox.extraction_dir().join("stale.txt");
    std::fs::create_dir_all(sandbox.extraction_dir()).expect("extraction dir");
    std::fs::write(&stale, b"left over").expect("stale file");
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.initializer.expect_init().times(1).returning(|_, _| Ok(()));
    let mut postgres = mocks.build(Config::default());

    postgres.install().expect("install");

    assert!(!stale.exists());
}

#[rstest]
fn install_surfaces_fetch_failure_without_extracting(sandbox: Sandbox) {
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks.fetcher.expect_fetch().times(1).returning(|_| {
        Err(FetchError::new(
            FetchErrorKind::NotFound,
            eyre!("no version found matching 12.1.0"),
        ))
    });
    mocks.initializer.expect_init().times(0);
    let mut postgres = mocks.build(Config::default());

    let err = postgres.install().expect_err("fetch fails");

    assert!(
        matches!(err, LifecycleError::Fetch(ref inner) if inner.kind() == FetchErrorKind::NotFound),
        "{err:?}"
    );
    assert!(!sandbox.extraction_dir().exists());
}

#[rstest]
fn install_surfaces_init_failure(sandbox: Sandbox) {
    sandbox.seed_archive();
    let mut mocks = Mocks::new(sandbox.archive_path());
    mocks
        .initializer
        .expect_init()
        .times(1)
        .returning(|_, _| Err(InitError::from(eyre!("initdb exited with 1"))));
    let mut postgres = mocks.build(Config::default());

    let err = postgres.install().expect_err("init fails");

    assert!(matches!(err, LifecycleError::Init(_)), "{err:?}");
}

#[rstest]
fn dropping_started_lifecycle_warns(sandbox: Sandbox) {
    let postgres = started(Mocks::new(sandbox.archive_path()), free_port());

    let (logs, ()) = capture_logs(Level::WARN, move || drop(postgres));

    assert!(
        logs.iter().any(|line| line.contains("dropped while postgres is running")),
        "{logs:?}"
    );
}

#[rstest]
fn dropping_stopped_lifecycle_is_silent(sandbox: Sandbox) {
    let postgres = Mocks::new(sandbox.archive_path()).build(Config::default());

    let (logs, ()) = capture_logs(Level::WARN, move || drop(postgres));

    assert!(logs.is_empty(), "{logs:?}");
}
