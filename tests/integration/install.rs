use jubilee_update::apply::{PendingUpdateMarker, StartupRecovery};
use jubilee_update::core::UpdateError;
use jubilee_update::test_utils::{
    FakePackageSource, FakeReleaseSource, TestEnvironment, build_package, release, sample_capture,
    sha256_hex,
};
use jubilee_update::update::{Clock, InstallOutcome, ManualClock, UpdateMachine, UpdateStatus};

const URL: &str = "https://cdn.jubileebrowser.com/releases/jubilee-8.0.5.zip";

/// An environment whose machine has already downloaded `files` as 8.0.5.
async fn downloaded(
    env: &TestEnvironment,
    files: &[(&str, &str)],
) -> UpdateMachine<FakeReleaseSource, FakePackageSource, ManualClock> {
    let package = build_package(files);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut machine = env.machine(releases, packages);
    assert_eq!(machine.request_check().await.status, UpdateStatus::Downloaded);
    machine
}

fn installed_marker(env: &TestEnvironment) -> String {
    std::fs::read_to_string(env.install_dir().join("jubilee")).unwrap()
}

#[tokio::test]
async fn test_install_replaces_installation() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("jubilee", "8.0.5"), ("resources/app.pak", "new")]).await;
    let sessions = env.sessions();
    let controller = env.controller();

    let outcome = machine.request_install(sample_capture(), &sessions, &controller).await.unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::RestartRequired {
            version: semver::Version::new(8, 0, 5)
        }
    );
    assert_eq!(installed_marker(&env), "8.0.5");
    assert_eq!(
        std::fs::read_to_string(env.install_dir().join("resources/app.pak")).unwrap(),
        "new"
    );
    assert_eq!(machine.snapshot().status, UpdateStatus::Installing);
    assert!(machine.next_wake_ms().is_none());

    assert!(!controller.marker().exists());
    assert!(controller.backups().exists());
    assert!(env.staging().installable().is_none());

    let snapshot = sessions.restore().unwrap();
    assert!(snapshot.pending_update);
    assert_eq!(snapshot.tabs, sample_capture().tabs);

    // First steady launch on the new version.
    sessions.acknowledge_upgrade().unwrap();
    assert!(controller.confirm_launch().unwrap());
    assert!(!controller.backups().exists());
    assert!(!sessions.restore().unwrap().pending_update);
}

#[tokio::test]
async fn test_package_without_entry_point_rolls_back() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("readme.txt", "no binary here")]).await;
    let sessions = env.sessions();
    let controller = env.controller();

    let outcome = machine.request_install(sample_capture(), &sessions, &controller).await.unwrap();

    assert!(matches!(outcome, InstallOutcome::RolledBack { .. }));
    assert_eq!(installed_marker(&env), "8.0.4");
    assert!(!env.install_dir().join("readme.txt").exists());
    assert!(!controller.marker().exists());

    let state = machine.snapshot();
    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.available_version.is_none());
    assert!(matches!(machine.take_last_failure(), Some(UpdateError::ApplyError { .. })));

    assert!(!sessions.restore().unwrap().pending_update);
    assert!(env.staging().load_record().is_none());
    assert_eq!(machine.next_wake_ms(), Some(env.clock.now_ms() + 120_000));
}

#[tokio::test]
async fn test_install_requires_downloaded_update() {
    let env = TestEnvironment::new();
    let mut machine = env.machine(FakeReleaseSource::new(Vec::new()), FakePackageSource::new());
    let sessions = env.sessions();

    let error = machine
        .request_install(sample_capture(), &sessions, &env.controller())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        UpdateError::InvalidTransition {
            from: UpdateStatus::Idle,
            ..
        }
    ));
    assert_eq!(machine.snapshot().status, UpdateStatus::Idle);
    assert!(sessions.restore().is_none());
    assert_eq!(installed_marker(&env), "8.0.4");
}

#[tokio::test]
async fn test_tampered_staged_package_is_refused() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("jubilee", "8.0.5")]).await;
    let record = env.staging().installable().unwrap();
    std::fs::write(&record.package_path, build_package(&[("jubilee", "evil")])).unwrap();

    let sessions = env.sessions();
    let controller = env.controller();
    let error = machine
        .request_install(sample_capture(), &sessions, &controller)
        .await
        .unwrap_err();

    assert!(matches!(error, UpdateError::IntegrityError { .. }));
    assert!(!error.is_fatal());
    assert_eq!(installed_marker(&env), "8.0.4");
    assert!(!controller.marker().exists());
    assert!(!controller.backups().exists());
    assert_eq!(machine.snapshot().status, UpdateStatus::Error);
    assert!(!sessions.restore().unwrap().pending_update);
}

#[tokio::test]
async fn test_vanished_package_fails_install() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("jubilee", "8.0.5")]).await;
    std::fs::remove_file(env.staging().installable().unwrap().package_path).unwrap();

    let sessions = env.sessions();
    let error = machine
        .request_install(sample_capture(), &sessions, &env.controller())
        .await
        .unwrap_err();

    assert!(matches!(error, UpdateError::TransferError { .. }));
    assert_eq!(machine.snapshot().status, UpdateStatus::Error);
    assert!(sessions.restore().is_none());
}

#[tokio::test]
async fn test_interrupted_install_recovers_on_startup() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("jubilee", "8.0.5")]).await;
    let controller = env.controller();
    machine
        .request_install(sample_capture(), &env.sessions(), &controller)
        .await
        .unwrap();

    // Simulate a crash after the swap but before the marker was cleared.
    let marker = PendingUpdateMarker {
        target_version: semver::Version::new(8, 0, 5),
        source_version: semver::Version::new(8, 0, 4),
        package_path: env.path().join("gone.zip"),
        install_dir: env.install_dir(),
        expected_thumbprint: None,
        started_at: chrono::Utc::now(),
    };
    controller.marker().write(&marker).unwrap();

    let recovery = controller.recover_on_startup().await.unwrap();
    assert_eq!(
        recovery,
        StartupRecovery::RolledBack {
            restored_version: semver::Version::new(8, 0, 4),
            interrupted_version: Some(semver::Version::new(8, 0, 5)),
        }
    );
    assert_eq!(installed_marker(&env), "8.0.4");
    assert!(!controller.marker().exists());
}

#[tokio::test]
async fn test_startup_rollback_is_recorded_as_failed_install() {
    let env = TestEnvironment::new();
    let mut machine = downloaded(&env, &[("jubilee", "8.0.5")]).await;
    let controller = env.controller();
    machine
        .request_install(sample_capture(), &env.sessions(), &controller)
        .await
        .unwrap();
    drop(machine);

    // The process died mid-swap: `installing` is on disk and the marker is still there.
    controller
        .marker()
        .write(&PendingUpdateMarker {
            target_version: semver::Version::new(8, 0, 5),
            source_version: semver::Version::new(8, 0, 4),
            package_path: env.path().join("gone.zip"),
            install_dir: env.install_dir(),
            expected_thumbprint: None,
            started_at: chrono::Utc::now(),
        })
        .unwrap();
    assert_eq!(env.store().read().unwrap().unwrap().status, UpdateStatus::Installing);

    let recovery = controller.recover_on_startup().await.unwrap();
    let mut machine = env.machine(FakeReleaseSource::new(Vec::new()), FakePackageSource::new());
    machine.record_interrupted_install(&recovery);

    let state = machine.snapshot();
    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    let message = state.last_error.unwrap();
    assert!(message.contains("8.0.5"), "{message}");
    assert!(message.contains("previous version was restored"), "{message}");
    assert!(matches!(
        machine.take_last_failure(),
        Some(UpdateError::ApplyError {
            rolled_back: true,
            ..
        })
    ));
    assert_eq!(machine.next_wake_ms(), Some(env.clock.now_ms() + 120_000));
    assert_eq!(env.store().read().unwrap().unwrap().consecutive_failures, 1);
}

#[tokio::test]
async fn test_clean_startup_records_nothing() {
    let env = TestEnvironment::new();
    let mut machine = env.machine(FakeReleaseSource::new(Vec::new()), FakePackageSource::new());
    let before = machine.next_wake_ms();

    machine.record_interrupted_install(&StartupRecovery::Clean);

    assert_eq!(machine.snapshot().status, UpdateStatus::Idle);
    assert_eq!(machine.next_wake_ms(), before);
    assert!(machine.take_last_failure().is_none());
}
