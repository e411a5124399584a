use jubilee_update::core::UpdateError;
use jubilee_update::test_utils::{
    FakePackageSource, FakeReleaseSource, TestEnvironment, build_package, release, sha256_hex,
};
use jubilee_update::update::{Clock, UpdateEvent, UpdateState, UpdateStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const URL: &str = "https://cdn.jubileebrowser.com/releases/jubilee-8.0.5.zip";

fn expected_backoff_ms(failures: u32) -> u64 {
    (60_000u64 << failures.min(6)).min(6 * 3_600_000)
}

#[tokio::test]
async fn test_backoff_grows_and_resets_after_success() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(vec![release("8.0.3", URL, &"a".repeat(64))]);
    releases.fail_with("connection refused");
    let mut machine = env.machine(releases.clone(), FakePackageSource::new());

    let state = machine.request_check().await;
    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);

    for failures in 1..=8u32 {
        let now = env.clock.now_ms();
        let wake = machine.next_wake_ms().unwrap();
        assert_eq!(wake - now, expected_backoff_ms(failures), "after {failures} failures");

        env.clock.set(wake);
        let state = machine.tick().await;
        assert_eq!(state.consecutive_failures, failures + 1);
    }

    releases.restore();
    env.clock.set(machine.next_wake_ms().unwrap());
    let state = machine.tick().await;
    assert_eq!(state.status, UpdateStatus::Idle);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_error.is_none());
    assert_eq!(machine.next_wake_ms().unwrap() - env.clock.now_ms(), 4 * 3_600_000);
}

#[tokio::test]
async fn test_tick_before_due_does_nothing() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(Vec::new());
    let mut machine = env.machine(releases.clone(), FakePackageSource::new());

    let first_wake = machine.next_wake_ms().unwrap();
    assert_eq!(first_wake - env.clock.now_ms(), 30_000);

    env.clock.advance(Duration::from_secs(29));
    machine.tick().await;
    assert_eq!(releases.calls(), 0);

    env.clock.advance(Duration::from_secs(1));
    machine.tick().await;
    assert_eq!(releases.calls(), 1);
}

#[tokio::test]
async fn test_restart_keeps_backoff_schedule() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(Vec::new());
    releases.fail_with("timed out");

    let mut machine = env.machine(releases.clone(), FakePackageSource::new());
    machine.request_check().await;
    let failed_at = env.clock.now_ms();
    drop(machine);

    let restarted = env.machine(releases, FakePackageSource::new());
    let state = restarted.snapshot();
    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert_eq!(restarted.next_wake_ms(), Some(failed_at + expected_backoff_ms(1)));
}

#[tokio::test]
async fn test_restart_respects_recent_check() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(Vec::new());
    let mut machine = env.machine(releases.clone(), FakePackageSource::new());
    machine.request_check().await;
    let checked_at = env.clock.now_ms();
    drop(machine);

    env.clock.advance(Duration::from_secs(3600));
    let restarted = env.machine(releases, FakePackageSource::new());
    assert_eq!(restarted.next_wake_ms(), Some(checked_at + 4 * 3_600_000));
}

#[tokio::test]
async fn test_downloaded_update_survives_restart() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);

    let mut machine = env.machine(releases.clone(), packages.clone());
    assert_eq!(machine.request_check().await.status, UpdateStatus::Downloaded);
    drop(machine);

    let restarted = env.machine(releases.clone(), packages.clone());
    assert_eq!(restarted.snapshot().status, UpdateStatus::Downloaded);
    assert_eq!(restarted.snapshot().download_progress, Some(100));
    drop(restarted);

    std::fs::remove_file(env.staging().load_record().unwrap().package_path).unwrap();
    let restarted = env.machine(releases, packages);
    assert_eq!(restarted.snapshot().status, UpdateStatus::Idle);
    assert!(restarted.snapshot().available_version.is_none());
}

#[tokio::test]
async fn test_check_while_downloaded_is_ignored() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut machine = env.machine(releases.clone(), packages);

    machine.request_check().await;
    assert_eq!(releases.calls(), 1);

    let state = machine.request_check().await;
    assert_eq!(state.status, UpdateStatus::Downloaded);
    assert_eq!(releases.calls(), 1);
}

#[tokio::test]
async fn test_downloaded_update_is_announced_again() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut machine = env.machine(releases, packages);
    machine.request_check().await;

    let mut events = machine.events().subscribe();
    let wake = machine.next_wake_ms().unwrap();
    assert_eq!(wake - env.clock.now_ms(), 15 * 60_000);

    env.clock.set(wake);
    machine.tick().await;
    match events.try_recv().unwrap() {
        UpdateEvent::StateChanged(state) => assert_eq!(state.status, UpdateStatus::Downloaded),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_observers_see_every_step() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut machine = env.machine(releases, packages);
    let mut events = machine.events().subscribe();
    let latest = machine.events().watch_state();

    machine.request_check().await;

    let mut statuses = Vec::new();
    let mut saw_progress = false;
    while let Ok(event) = events.try_recv() {
        match event {
            UpdateEvent::StateChanged(state) => {
                if statuses.last() != Some(&state.status) {
                    statuses.push(state.status);
                }
            }
            UpdateEvent::DownloadProgress(_) => saw_progress = true,
        }
    }

    assert_eq!(
        statuses,
        vec![
            UpdateStatus::Checking,
            UpdateStatus::Available,
            UpdateStatus::Downloading,
            UpdateStatus::Downloaded
        ]
    );
    assert!(saw_progress);
    assert_eq!(latest.borrow().status, UpdateStatus::Downloaded);
}

#[tokio::test]
async fn test_release_published_later_is_found_on_schedule() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(vec![release("8.0.4", URL, &"a".repeat(64))]);
    let mut settings = env.settings();
    settings.auto_download = false;
    let mut machine = env.machine_with(settings, releases.clone(), FakePackageSource::new());

    assert_eq!(machine.request_check().await.status, UpdateStatus::Idle);

    releases.set_releases(vec![release("8.0.5", URL, &"a".repeat(64))]);
    env.clock.advance(Duration::from_secs(3600));
    assert_eq!(machine.tick().await.status, UpdateStatus::Idle);

    env.clock.set(machine.next_wake_ms().unwrap());
    let state = machine.tick().await;
    assert_eq!(state.status, UpdateStatus::Available);
    assert_eq!(state.available_version, Some(semver::Version::new(8, 0, 5)));
    assert_eq!(releases.calls(), 2);
}

#[tokio::test]
async fn test_download_progress_is_persisted() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5"), ("resources/app.pak", &"x".repeat(4096))]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);

    let store = env.store();
    let midway: Arc<Mutex<Option<UpdateState>>> = Arc::default();
    let seen = midway.clone();
    let packages = FakePackageSource::new().with_paused_package(URL, package, move || {
        *seen.lock().unwrap() = store.read().unwrap();
    });
    let mut machine = env.machine(releases, packages);
    let latest = machine.events().watch_state();

    assert_eq!(machine.request_check().await.status, UpdateStatus::Downloaded);

    let midway = midway.lock().unwrap().clone().unwrap();
    assert_eq!(midway.status, UpdateStatus::Downloading);
    let percent = midway.download_progress.unwrap();
    assert!((1..100).contains(&percent), "persisted progress {percent}");

    assert_eq!(machine.snapshot().download_progress, Some(100));
    assert_eq!(env.store().read().unwrap().unwrap(), machine.snapshot());
    assert_eq!(*latest.borrow(), machine.snapshot());
}

#[tokio::test]
async fn test_manual_download_leaves_available() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut settings = env.settings();
    settings.auto_download = false;
    let mut machine = env.machine_with(settings, releases.clone(), packages);

    assert_eq!(machine.request_check().await.status, UpdateStatus::Available);
    assert!(env.staging().installable().is_none());

    // Scheduled and manual checks still run while the update waits.
    env.clock.set(machine.next_wake_ms().unwrap());
    assert_eq!(machine.tick().await.status, UpdateStatus::Available);
    assert_eq!(machine.request_check().await.status, UpdateStatus::Available);
    assert_eq!(releases.calls(), 3);

    let state = machine.request_download().await;
    assert_eq!(state.status, UpdateStatus::Downloaded);
    assert_eq!(state.available_version, Some(semver::Version::new(8, 0, 5)));
    assert_eq!(releases.calls(), 3);
    assert!(env.staging().installable().is_some());
}

#[tokio::test]
async fn test_download_request_checks_first() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    let mut settings = env.settings();
    settings.auto_download = false;
    let mut machine = env.machine_with(settings, releases.clone(), packages);

    assert_eq!(machine.request_download().await.status, UpdateStatus::Downloaded);
    assert_eq!(releases.calls(), 1);

    assert_eq!(machine.request_download().await.status, UpdateStatus::Downloaded);
    assert_eq!(releases.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_manifest_fetch_times_out() {
    let env = TestEnvironment::new();
    let releases = FakeReleaseSource::new(Vec::new());
    releases.stall();
    let mut machine = env.machine(releases.clone(), FakePackageSource::new());

    let state = machine.request_check().await;

    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.unwrap().contains("timed out"));
    assert!(matches!(machine.take_last_failure(), Some(UpdateError::NetworkError { .. })));
    assert_eq!(machine.next_wake_ms().unwrap() - env.clock.now_ms(), expected_backoff_ms(1));

    releases.restore();
    env.clock.set(machine.next_wake_ms().unwrap());
    assert_eq!(machine.tick().await.status, UpdateStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_download_times_out() {
    let env = TestEnvironment::new();
    let package = build_package(&[("jubilee", "8.0.5"), ("resources/app.pak", &"x".repeat(4096))]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_stalled_package(URL, package);
    let mut machine = env.machine(releases, packages);

    let state = machine.request_check().await;

    assert_eq!(state.status, UpdateStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.available_version.is_none());
    assert!(state.download_progress.is_none());
    assert!(matches!(machine.take_last_failure(), Some(UpdateError::TransferError { .. })));
    assert_eq!(machine.next_wake_ms().unwrap() - env.clock.now_ms(), expected_backoff_ms(1));

    let leftovers: Vec<_> = std::fs::read_dir(env.staging().dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty(), "partial downloads left behind: {leftovers:?}");
    assert!(env.staging().installable().is_none());
}
