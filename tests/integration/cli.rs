use assert_cmd::Command;
use jubilee_update::apply::{BackupManager, MarkerFile, PendingUpdateMarker};
use jubilee_update::test_utils::{TestEnvironment, sample_capture};
use predicates::prelude::*;
use std::path::Path;

/// Nothing listens here, so every check fails fast with a network error.
const DEAD_ENDPOINT: &str = "http://127.0.0.1:1/manifest.json";

fn jubilee_update(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jubilee-update").unwrap();
    cmd.arg("--config")
        .arg(config)
        .env("NO_COLOR", "1")
        .env("JUBILEE_UPDATE_NO_PROGRESS", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn pending_marker(env: &TestEnvironment) -> PendingUpdateMarker {
    PendingUpdateMarker {
        target_version: semver::Version::new(8, 0, 5),
        source_version: semver::Version::new(8, 0, 4),
        package_path: env.path().join("jubilee-8.0.5.zip"),
        install_dir: env.install_dir(),
        expected_thumbprint: None,
        started_at: chrono::Utc::now(),
    }
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("jubilee-update")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("recover"))
        .stdout(predicate::str::contains("confirm"))
        .stdout(predicate::str::contains("--no-progress"));
}

#[test]
fn test_status_on_fresh_install() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);

    jubilee_update(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Update status:"))
        .stdout(predicate::str::contains("idle"))
        .stdout(predicate::str::contains("8.0.4"));
}

#[test]
fn test_status_json() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);

    let output = jubilee_update(&config).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["state"]["status"], "idle");
    assert_eq!(value["state"]["currentVersion"], "8.0.4");
    assert_eq!(value["pendingUpdateMarker"], false);
}

#[test]
fn test_session_show() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);

    jubilee_update(&config)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no session"));

    env.sessions().snapshot(sample_capture(), false).unwrap();
    jubilee_update(&config)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://jubileebibles.org/john/3"))
        .stdout(predicate::str::contains("\"activeTabId\": \"t2\""));
}

#[test]
fn test_recover_without_marker() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);

    jubilee_update(&config)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("No interrupted update found"));
}

#[test]
fn test_recover_rolls_back_interrupted_update() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);
    BackupManager::new(env.paths.backup_dir())
        .create(&env.install_dir(), &semver::Version::new(8, 0, 4))
        .unwrap();
    std::fs::write(env.install_dir().join("jubilee"), "half-written").unwrap();
    MarkerFile::new(env.paths.pending_update_file()).write(&pending_marker(&env)).unwrap();
    env.sessions().snapshot(sample_capture(), true).unwrap();

    jubilee_update(&config)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("rolled back"));

    assert_eq!(std::fs::read_to_string(env.install_dir().join("jubilee")).unwrap(), "8.0.4");
    assert!(!env.paths.pending_update_file().exists());
    assert!(!env.sessions().restore().unwrap().pending_update);

    let state = env.store().read().unwrap().unwrap();
    assert_eq!(state.status.as_str(), "error");
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.unwrap().contains("8.0.5"));
}

#[test]
fn test_recover_without_backup_exits_with_code_2() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);
    MarkerFile::new(env.paths.pending_update_file()).write(&pending_marker(&env)).unwrap();

    jubilee_update(&config)
        .arg("recover")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Rollback failed"));

    assert!(env.paths.pending_update_file().exists());
}

#[test]
fn test_confirm_prunes_backup() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);
    let backups = BackupManager::new(env.paths.backup_dir());
    backups.create(&env.install_dir(), &semver::Version::new(8, 0, 4)).unwrap();
    env.sessions().snapshot(sample_capture(), true).unwrap();

    jubilee_update(&config)
        .arg("confirm")
        .assert()
        .success()
        .stdout(predicate::str::contains("backup removed"));

    assert!(!backups.exists());
    assert!(!env.sessions().restore().unwrap().pending_update);
}

#[test]
fn test_confirm_refuses_while_marker_present() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);
    let backups = BackupManager::new(env.paths.backup_dir());
    backups.create(&env.install_dir(), &semver::Version::new(8, 0, 4)).unwrap();
    MarkerFile::new(env.paths.pending_update_file()).write(&pending_marker(&env)).unwrap();

    jubilee_update(&config)
        .arg("confirm")
        .assert()
        .success()
        .stdout(predicate::str::contains("still pending"));

    assert!(backups.exists());
}

#[test]
fn test_check_reports_network_failure() {
    let env = TestEnvironment::new();
    let config = env.write_config(DEAD_ENDPOINT);

    jubilee_update(&config)
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Network error"));

    let state = env.store().read().unwrap().unwrap();
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.is_some());
}

#[test]
fn test_insecure_endpoint_is_rejected() {
    let env = TestEnvironment::new();
    let config = env.write_config("http://updates.example.com/manifest.json");

    jubilee_update(&config)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("only https is allowed"));
}

#[test]
fn test_malformed_config_is_rejected() {
    let env = TestEnvironment::new();
    let config = env.path().join("broken.json");
    std::fs::write(&config, "{ not json").unwrap();

    jubilee_update(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid agent config"));
}
