//! Shared setup for CLI commands.

use crate::apply::{ApplyController, BackupManager, MarkerFile};
use crate::config::{AgentConfig, AgentPaths};
use crate::download::{Downloader, HttpPackageSource, StagingArea};
use crate::manifest::HttpReleaseSource;
use crate::session::SessionManager;
use crate::update::{MachineSettings, SystemClock, UpdateMachine, UpdateStore};
use crate::utils::AgentLock;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

pub type HttpMachine = UpdateMachine<HttpReleaseSource, HttpPackageSource, SystemClock>;

/// Configuration, paths and version every command starts from.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub config: AgentConfig,
    pub paths: AgentPaths,
    pub current_version: semver::Version,
}

impl AgentContext {
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = AgentConfig::load(config_path).await?;
        let paths = config.paths()?;
        let current_version = config.current_version()?;
        Ok(Self {
            config,
            paths,
            current_version,
        })
    }

    /// Takes the single-instance lock; held by every mutating command.
    pub fn lock(&self) -> Result<AgentLock> {
        Ok(AgentLock::try_acquire(&self.paths.lock_file())?)
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
    pub fn marker(&self) -> MarkerFile {
        MarkerFile::new(self.paths.pending_update_file())
    }

    #[must_use]
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(self.paths.backup_dir())
    }

    pub fn install_dir(&self) -> Result<PathBuf> {
        self.config.install_dir()
    }

    pub fn controller(&self) -> Result<ApplyController> {
        Ok(ApplyController::new(
            self.install_dir()?,
            &self.config.entry_point,
            self.current_version.clone(),
            self.marker(),
            self.backups(),
        )
        .with_expected_thumbprint(self.config.certificate_thumbprint()))
    }

    /// A machine wired to the network, the state file and the wall clock.
    ///
    /// With `auto_download` off a check stops at `available`.
    pub fn machine(&self, auto_download: bool) -> Result<HttpMachine> {
        let releases = HttpReleaseSource::new(self.config.fetch_timeout())?;
        let packages = HttpPackageSource::new()?;
        let downloader =
            Downloader::new(packages, self.config.signature_verifier()?, self.config.download_timeout());

        let settings = MachineSettings {
            auto_download,
            ..MachineSettings::from_config(&self.config)
        };
        Ok(UpdateMachine::new(
            settings,
            self.current_version.clone(),
            releases,
            downloader,
            self.staging(),
            self.store(),
            SystemClock,
        ))
    }
}

pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<18} {}", format!("{label}:").bold(), value);
}
