//! Fixtures: releases, packages, sessions and a throwaway agent layout.

use crate::apply::{ApplyController, BackupManager, MarkerFile};
use crate::config::{AgentConfig, AgentPaths};
use crate::download::{Downloader, StagingArea};
use crate::manifest::{Channel, ReleaseDescriptor};
use crate::session::{BrowsingMode, SessionCapture, SessionManager, SessionTab, WindowBounds};
use crate::update::{MachineSettings, ManualClock, UpdateMachine, UpdateStore};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use super::fakes::{FakePackageSource, FakeReleaseSource};

pub const ENTRY_POINT: &str = "jubilee";

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A stable release for `version`.
#[must_use]
pub fn release(version: &str, url: &str, digest: &str) -> ReleaseDescriptor {
    ReleaseDescriptor {
        version: semver::Version::parse(version).unwrap(),
        channel: Channel::Stable,
        download_url: url.to_string(),
        digest: digest.to_string(),
        signature: None,
        release_notes: String::new(),
    }
}

/// Zips `files` (name, content) into package bytes.
#[must_use]
pub fn build_package(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Three tabs in the Jubilee Bibles mode, maximized, second tab active.
#[must_use]
pub fn sample_capture() -> SessionCapture {
    let tab = |id: &str, url: &str, active: bool| SessionTab {
        id: id.to_string(),
        url: url.to_string(),
        title: format!("Tab {id}"),
        mode: BrowsingMode::JubileeBibles,
        is_active: active,
    };
    SessionCapture {
        window_bounds: WindowBounds {
            x: 10,
            y: 20,
            width: 1280,
            height: 800,
        },
        is_maximized: true,
        current_mode: BrowsingMode::JubileeBibles,
        tabs: vec![
            tab("t1", "https://jubileebibles.org/genesis/1", false),
            tab("t2", "https://jubileebibles.org/john/3", true),
            tab("t3", "https://jubileebibles.org/psalms/23", false),
        ],
        active_tab_id: Some("t2".to_string()),
    }
}

/// A temporary data directory and installation (version 8.0.4).
pub struct TestEnvironment {
    pub temp: TempDir,
    pub paths: AgentPaths,
    pub clock: ManualClock,
}

impl TestEnvironment {
    #[must_use]
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = AgentPaths::new(temp.path().join("data"));
        let install = temp.path().join("app");
        std::fs::create_dir_all(&install).unwrap();
        std::fs::write(install.join(ENTRY_POINT), "8.0.4").unwrap();
        Self {
            temp,
            paths,
            clock: ManualClock::new(1_700_000_000_000),
        }
    }

    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.temp.path().join("app")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    #[must_use]
    pub fn current_version() -> semver::Version {
        semver::Version::new(8, 0, 4)
    }

    #[must_use]
    pub fn settings(&self) -> MachineSettings {
        MachineSettings::from_config(&AgentConfig::default())
    }

    #[must_use]
    pub fn store(&self) -> UpdateStore {
        UpdateStore::new(self.paths.update_state_file())
    }

    #[must_use]
    pub fn staging(&self) -> StagingArea {
        StagingArea::new(self.paths.staging_dir())
    }

    #[must_use]
    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.paths.session_file())
    }

    #[must_use]
    pub fn controller(&self) -> ApplyController {
        ApplyController::new(
            self.install_dir(),
            ENTRY_POINT,
            Self::current_version(),
            MarkerFile::new(self.paths.pending_update_file()),
            BackupManager::new(self.paths.backup_dir()),
        )
    }

    /// A machine over fake transports and this environment's clock.
    #[must_use]
    pub fn machine(
        &self,
        releases: FakeReleaseSource,
        packages: FakePackageSource,
    ) -> UpdateMachine<FakeReleaseSource, FakePackageSource, ManualClock> {
        self.machine_with(self.settings(), releases, packages)
    }

    #[must_use]
    pub fn machine_with(
        &self,
        settings: MachineSettings,
        releases: FakeReleaseSource,
        packages: FakePackageSource,
    ) -> UpdateMachine<FakeReleaseSource, FakePackageSource, ManualClock> {
        let downloader = Downloader::new(packages, None, Duration::from_secs(10)).with_progress_interval(Duration::ZERO);
        UpdateMachine::new(
            settings,
            Self::current_version(),
            releases,
            downloader,
            self.staging(),
            self.store(),
            self.clock.clone(),
        )
    }

    /// Writes an agent configuration that keeps all state inside this environment.
    pub fn write_config(&self, endpoint: &str) -> PathBuf {
        let config = AgentConfig {
            update_endpoint: endpoint.to_string(),
            install_dir: Some(self.install_dir()),
            entry_point: ENTRY_POINT.to_string(),
            data_dir: Some(self.paths.data_dir().to_path_buf()),
            current_version: Some(Self::current_version()),
            ..AgentConfig::default()
        };
        let path = self.temp.path().join("update-agent.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        path
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
