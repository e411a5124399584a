//! Installation backup for rollback.
//!
//! One backup at a time lives under `<data dir>/backup/`:
//!
//! ```text
//! backup/
//! ├── backup.json   # BackupRecord, written last
//! └── files/        # copy of the installation directory
//! ```
//!
//! `backup.json` is written only after the copy finished, so a backup without
//! a record is incomplete and never restored from.
//!
//! Everything here is synchronous: it runs on the blocking task that performs
//! the swap.

use crate::constants::{BACKUP_RECORD_FILE_NAME, RESTORE_MAX_ATTEMPTS, RESTORE_RETRY_DELAY};
use crate::utils::fs::{copy_dir, read_json, remove_dir_all, remove_file_if_exists, write_json_atomic};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub backup_path: PathBuf,
    pub source_version: semver::Version,
    pub install_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    fn files_dir(&self) -> PathBuf {
        self.dir.join("files")
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(BACKUP_RECORD_FILE_NAME)
    }

    /// Copies `install_dir` into the backup area, superseding any previous backup.
    pub fn create(&self, install_dir: &Path, source_version: &semver::Version) -> Result<BackupRecord> {
        if !install_dir.is_dir() {
            bail!("Installation directory does not exist: {}", install_dir.display());
        }

        // The record goes first so a crash below never leaves a record
        // pointing at a half-replaced copy.
        remove_file_if_exists(&self.record_path()).context("Failed to remove old backup record")?;
        let files = self.files_dir();
        if files.exists() {
            debug!("Removing old backup at {}", files.display());
            remove_dir_all(&files).context("Failed to remove old backup")?;
        }

        info!("Creating backup of {} at {}", install_dir.display(), files.display());
        copy_dir(install_dir, &files).context("Failed to create backup")?;

        let record = BackupRecord {
            backup_path: files,
            source_version: source_version.clone(),
            install_dir: install_dir.to_path_buf(),
            created_at: Utc::now(),
        };
        write_json_atomic(&self.record_path(), &record).context("Failed to write backup record")?;

        info!(version = %record.source_version, "Backup created successfully");
        Ok(record)
    }

    /// The current backup, if it is complete.
    ///
    /// # Errors
    ///
    /// Fails when the record is missing or unreadable, or the files it points at are gone.
    pub fn load(&self) -> Result<BackupRecord> {
        let record: BackupRecord = read_json(&self.record_path())?
            .ok_or_else(|| anyhow::anyhow!("No backup record at {}", self.record_path().display()))?;

        if !record.backup_path.is_dir() {
            bail!("Backup files missing at {}", record.backup_path.display());
        }
        Ok(record)
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.load().is_ok()
    }

    /// Replaces `install_dir` with the backup, retrying when files are locked.
    pub fn restore(&self, install_dir: &Path) -> Result<BackupRecord> {
        let record = self.load()?;
        warn!("Restoring {} from backup at {}", install_dir.display(), record.backup_path.display());

        let mut attempts = 0;
        loop {
            attempts += 1;
            match Self::attempt_restore(&record.backup_path, install_dir) {
                Ok(()) => {
                    info!(version = %record.source_version, "Successfully restored from backup");
                    return Ok(record);
                }
                Err(e) if attempts < RESTORE_MAX_ATTEMPTS => {
                    warn!("Restore attempt {attempts} failed: {e:#}. Retrying...");
                    std::thread::sleep(RESTORE_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Failed to restore backup after {RESTORE_MAX_ATTEMPTS} attempts"
                    )));
                }
            }
        }
    }

    fn attempt_restore(backup: &Path, install_dir: &Path) -> Result<()> {
        remove_dir_all(install_dir).context("Failed to remove damaged installation")?;
        copy_dir(backup, install_dir).context("Failed to copy backup into place")
    }

    /// Deletes the backup. Missing backups are fine.
    pub fn prune(&self) -> Result<bool> {
        if !self.dir.exists() {
            return Ok(false);
        }
        debug!("Pruning backup at {}", self.dir.display());
        remove_dir_all(&self.dir).context("Failed to remove backup")?;
        Ok(true)
    }
}
