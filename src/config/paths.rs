//! Locations of everything the agent persists.

use crate::constants::{
    APP_DIR_NAME, DATA_DIR_ENV, LOG_FILE_NAME, PENDING_UPDATE_FILE_NAME, SESSION_STATE_FILE_NAME,
    UPDATE_STATE_FILE_NAME,
};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Every persisted path, derived from a single data directory:
///
/// ```text
/// <data dir>/
/// ├── update-state.json
/// ├── session-state.json
/// ├── pending-update.json
/// ├── staging/
/// ├── backup/
/// ├── logs/update.log
/// └── .locks/agent.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    data_dir: PathBuf,
}

impl AgentPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// `JUBILEE_UPDATE_DATA_DIR`, else the platform local data dir.
    ///
    /// - Windows: `%LOCALAPPDATA%\jubilee-browser`
    /// - macOS: `~/Library/Application Support/jubilee-browser`
    /// - Linux: `~/.local/share/jubilee-browser`
    pub fn default_data_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn update_state_file(&self) -> PathBuf {
        self.data_dir.join(UPDATE_STATE_FILE_NAME)
    }

    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join(SESSION_STATE_FILE_NAME)
    }

    #[must_use]
    pub fn pending_update_file(&self) -> PathBuf {
        self.data_dir.join(PENDING_UPDATE_FILE_NAME)
    }

    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backup")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("logs").join(LOG_FILE_NAME)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(".locks").join("agent.lock")
    }
}
