use jubilee_update::apply::{MarkerFile, PendingUpdateMarker};
use jubilee_update::core::UpdateError;
use jubilee_update::session::{BrowsingContext, BrowsingMode, RestorePlan, SessionCapture, SessionManager};
use jubilee_update::test_utils::{
    FakePackageSource, FakeReleaseSource, TestEnvironment, build_package, init_test_logging, release,
    sample_capture, sha256_hex,
};
use jubilee_update::update::{Clock, UpdateStatus};

const URL: &str = "https://cdn.jubileebrowser.com/releases/jubilee-8.0.5.zip";

#[tokio::test]
async fn test_newer_release_becomes_available() {
    init_test_logging(None);
    let env = TestEnvironment::new();
    let mut settings = env.settings();
    settings.auto_download = false;

    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &"a".repeat(64))]);
    let mut machine = env.machine_with(settings, releases, FakePackageSource::new());

    let state = machine.request_check().await;
    assert_eq!(state.status, UpdateStatus::Available);
    assert_eq!(state.available_version, Some(semver::Version::new(8, 0, 5)));
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_older_release_leaves_machine_idle() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(vec![release("8.0.3", URL, &"a".repeat(64))]);
    let mut machine = env.machine(releases, FakePackageSource::new());

    let before = env.clock.now_ms();
    let state = machine.request_check().await;

    assert_eq!(state.status, UpdateStatus::Idle);
    assert_eq!(state.last_check_time, Some(before));
    assert!(state.available_version.is_none());
    assert_eq!(env.store().read().unwrap().unwrap().last_check_time, Some(before));
}

#[tokio::test]
async fn test_digest_mismatch_discards_package() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(b"something else"))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut machine = env.machine(releases, packages);

    let state = machine.request_check().await;

    assert_eq!(state.status, UpdateStatus::Error);
    assert!(state.last_error.as_deref().unwrap().contains("Integrity check failed"));
    assert!(matches!(machine.take_last_failure(), Some(UpdateError::IntegrityError { .. })));

    let record = env.staging().load_record().unwrap();
    assert!(!record.verified);
    assert!(!record.package_path.exists());
    assert!(env.staging().installable().is_none());
}

#[tokio::test]
async fn test_marker_without_backup_is_fatal() {
    let env = TestEnvironment::new();
    let controller = env.controller();
    MarkerFile::new(env.paths.pending_update_file())
        .write(&PendingUpdateMarker {
            target_version: semver::Version::new(8, 0, 5),
            source_version: semver::Version::new(8, 0, 4),
            package_path: env.path().join("jubilee-8.0.5.zip"),
            install_dir: env.install_dir(),
            expected_thumbprint: None,
            started_at: chrono::Utc::now(),
        })
        .unwrap();

    let error = controller.recover_on_startup().await.unwrap_err();
    assert!(matches!(error, UpdateError::RollbackError { .. }));
    assert!(error.is_fatal());
    assert!(controller.marker().exists());
}

#[derive(Default)]
struct FakeBrowser {
    capture: Option<SessionCapture>,
    restored: Vec<RestorePlan>,
}

impl BrowsingContext for FakeBrowser {
    fn capture(&self) -> SessionCapture {
        self.capture.clone().unwrap()
    }

    fn restore(&mut self, plan: &RestorePlan) {
        self.restored.push(plan.clone());
    }
}

#[test]
fn test_session_survives_crash() {
    let env = TestEnvironment::new();
    let before = FakeBrowser {
        capture: Some(sample_capture()),
        ..FakeBrowser::default()
    };
    env.sessions().snapshot_context(&before, false).unwrap();
    drop(before);

    // A fresh process after the crash.
    let manager = SessionManager::new(env.paths.session_file());
    let mut browser = FakeBrowser::default();
    assert!(manager.restore_into(&mut browser).unwrap());

    let plan = &browser.restored[0];
    let original = sample_capture();
    assert_eq!(plan.tabs, original.tabs);
    assert_eq!(plan.window_bounds, original.window_bounds);
    assert!(plan.is_maximized);
    assert_eq!(plan.current_mode, BrowsingMode::JubileeBibles);
    assert_eq!(plan.active_tab_id.as_deref(), Some("t2"));
    assert!(!plan.after_update);
}

#[test]
fn test_restore_is_idempotent() {
    let env = TestEnvironment::new();
    let sessions = env.sessions();
    sessions.snapshot(sample_capture(), true).unwrap();

    let first = sessions.restore().unwrap();
    let second = sessions.restore().unwrap();
    assert_eq!(first, second);
}
