use jubilee_update::core::UpdateError;
use jubilee_update::test_utils::{
    FakePackageSource, FakeReleaseSource, TestEnvironment, build_package, release, sample_capture,
    sha256_hex,
};
use jubilee_update::update::{InstallOutcome, UpdateAgent, UpdateStatus};
use std::time::Duration;
use tokio::sync::watch;

const URL: &str = "https://cdn.jubileebrowser.com/releases/jubilee-8.0.5.zip";
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn sources() -> (FakeReleaseSource, FakePackageSource) {
    let package = build_package(&[("jubilee", "8.0.5")]);
    let releases = FakeReleaseSource::new(vec![release("8.0.5", URL, &sha256_hex(&package))]);
    let packages = FakePackageSource::new().with_package(URL, package);
    (releases, packages)
}

#[tokio::test]
async fn test_handle_checks_and_installs() {
    let env = TestEnvironment::new();
    let (releases, packages) = sources();
    let machine = env.machine(releases, packages);
    let (agent, handle) = UpdateAgent::new(machine, env.sessions(), env.controller());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        let state = handle.request_check().await.unwrap();
        assert_eq!(state.status, UpdateStatus::Downloaded);

        let outcome = handle.request_install(sample_capture()).await.unwrap();
        assert_eq!(
            outcome,
            InstallOutcome::RestartRequired {
                version: semver::Version::new(8, 0, 5)
            }
        );
        shutdown_tx.send(true).unwrap();
    };

    let (machine, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(agent.run(shutdown_rx), driver) })
        .await
        .unwrap();

    assert_eq!(machine.snapshot().status, UpdateStatus::Installing);
    assert!(env.sessions().restore().unwrap().pending_update);
}

#[tokio::test]
async fn test_handle_fails_after_agent_stops() {
    let env = TestEnvironment::new();
    let (releases, packages) = sources();
    let (agent, handle) = UpdateAgent::new(env.machine(releases, packages), env.sessions(), env.controller());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(TEST_TIMEOUT, agent.run(shutdown_rx)).await.unwrap();

    let error = handle.request_check().await.unwrap_err();
    assert!(matches!(error, UpdateError::Busy { .. }));
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_agent() {
    let env = TestEnvironment::new();
    let (releases, packages) = sources();
    let (agent, _handle) = UpdateAgent::new(env.machine(releases, packages), env.sessions(), env.controller());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    drop(shutdown_tx);
    let machine = tokio::time::timeout(TEST_TIMEOUT, agent.run(shutdown_rx)).await.unwrap();
    assert_eq!(machine.snapshot().status, UpdateStatus::Idle);
}

#[tokio::test]
async fn test_timer_runs_due_check() {
    let env = TestEnvironment::new();
    let (releases, packages) = sources();
    let mut settings = env.settings();
    settings.initial_delay = Duration::ZERO;
    settings.auto_download = false;

    let machine = env.machine_with(settings, releases.clone(), packages);
    let (agent, _handle) = UpdateAgent::new(machine, env.sessions(), env.controller());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        while releases.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
    };

    let (machine, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(agent.run(shutdown_rx), driver) })
        .await
        .unwrap();

    assert_eq!(releases.calls(), 1);
    assert_eq!(machine.snapshot().status, UpdateStatus::Available);
}

#[tokio::test]
async fn test_handle_downloads_on_request() {
    let env = TestEnvironment::new();
    let (releases, packages) = sources();
    let mut settings = env.settings();
    settings.auto_download = false;
    let machine = env.machine_with(settings, releases.clone(), packages);
    let (agent, handle) = UpdateAgent::new(machine, env.sessions(), env.controller());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        assert_eq!(handle.request_check().await.unwrap().status, UpdateStatus::Available);
        assert_eq!(handle.request_download().await.unwrap().status, UpdateStatus::Downloaded);
        shutdown_tx.send(true).unwrap();
    };

    let (machine, ()) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(agent.run(shutdown_rx), driver) })
        .await
        .unwrap();

    assert_eq!(releases.calls(), 1);
    assert_eq!(machine.snapshot().download_progress, Some(100));
    assert!(env.staging().installable().is_some());
}
