//! Apply and rollback of staged packages.
//!
//! # Apply sequence
//!
//! 1. Refuse unless the staged package is verified and still hashes to the
//!    recorded digest. Nothing on disk has changed at this point.
//! 2. Write the pending-update marker.
//! 3. Back up the installation directory (superseding any older backup).
//! 4. Extract the package next to the installation and swap it in by rename.
//! 5. Check that the entry point exists in the new installation.
//! 6. Remove the marker.
//!
//! A failure in steps 3–5 restores the backup and reports
//! [`ApplyOutcome::RolledBack`]. If the restore fails too, the marker stays
//! and the error is a fatal [`UpdateError::RollbackError`].
//!
//! Steps 2–6 run on a blocking task. Dropping the caller's future does not
//! abort them, so a swap always either completes or rolls back.
//!
//! # Startup
//!
//! [`ApplyController::recover_on_startup`] finds a marker left by a process
//! that died mid-swap and restores the backup. A marker without a usable
//! backup cannot be repaired automatically and is fatal.

pub mod backup;
pub mod marker;

use crate::core::{UpdateError, UpdateResult};
use crate::download::{ChecksumVerifier, StagingRecord};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub use backup::{BackupManager, BackupRecord};
pub use marker::{MarkerFile, PendingUpdateMarker};

/// How an apply ended when it did not fail fatally.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The new version is in place; the process should restart.
    Applied { version: semver::Version },
    /// The swap failed and the previous installation was restored.
    RolledBack { error: UpdateError },
}

/// What startup recovery found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRecovery {
    /// No interrupted apply.
    Clean,
    /// An interrupted apply of `interrupted_version` was rolled back to
    /// `restored_version`. The target is unknown when the marker was damaged.
    RolledBack {
        restored_version: semver::Version,
        interrupted_version: Option<semver::Version>,
    },
}

#[derive(Debug, Clone)]
pub struct ApplyController {
    install_dir: PathBuf,
    entry_point: PathBuf,
    current_version: semver::Version,
    expected_thumbprint: Option<String>,
    marker: MarkerFile,
    backups: BackupManager,
}

impl ApplyController {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        entry_point: impl Into<PathBuf>,
        current_version: semver::Version,
        marker: MarkerFile,
        backups: BackupManager,
    ) -> Self {
        Self {
            install_dir: install_dir.into(),
            entry_point: entry_point.into(),
            current_version,
            expected_thumbprint: None,
            marker,
            backups,
        }
    }

    #[must_use]
    pub fn with_expected_thumbprint(mut self, thumbprint: Option<String>) -> Self {
        self.expected_thumbprint = thumbprint;
        self
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    #[must_use]
    pub fn marker(&self) -> &MarkerFile {
        &self.marker
    }

    #[must_use]
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Installs the staged package.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::ApplyError`] or [`UpdateError::IntegrityError`] when the
    ///   package is refused; the installation was not touched
    /// - [`UpdateError::RollbackError`] when a failed swap could not be undone
    pub async fn apply(&self, staged: &StagingRecord) -> UpdateResult<ApplyOutcome> {
        let version = staged.version.clone();

        if !staged.verified {
            return Err(UpdateError::ApplyError {
                version: version.to_string(),
                reason: "the staged package has not been verified".to_string(),
                rolled_back: false,
            });
        }
        let Some(digest) = staged.actual_digest.as_deref() else {
            return Err(UpdateError::ApplyError {
                version: version.to_string(),
                reason: "the staged package has no recorded digest".to_string(),
                rolled_back: false,
            });
        };
        ChecksumVerifier::verify_file(&staged.package_path, digest).await?;

        let marker = PendingUpdateMarker {
            target_version: version.clone(),
            source_version: self.current_version.clone(),
            package_path: staged.package_path.clone(),
            install_dir: self.install_dir.clone(),
            expected_thumbprint: self.expected_thumbprint.clone(),
            started_at: Utc::now(),
        };

        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.swap_blocking(&marker))
            .await
            .map_err(|e| UpdateError::rollback(format!("apply task panicked: {e}")))?
    }

    fn swap_blocking(&self, marker: &PendingUpdateMarker) -> UpdateResult<ApplyOutcome> {
        let version = marker.target_version.clone();
        info!(from = %marker.source_version, to = %version, "Applying update");

        self.marker.write(marker).map_err(|e| UpdateError::ApplyError {
            version: version.to_string(),
            reason: format!("could not write the pending-update marker: {e:#}"),
            rolled_back: false,
        })?;

        let mut backed_up = false;
        let result = self.replace_installation(&marker.package_path, &mut backed_up);

        let Err(cause) = result else {
            self.marker.clear().map_err(UpdateError::storage)?;
            info!(version = %version, "Update applied");
            return Ok(ApplyOutcome::Applied {
                version,
            });
        };

        error!(version = %version, "Apply failed: {cause:#}");
        let apply_error = UpdateError::ApplyError {
            version: version.to_string(),
            reason: format!("{cause:#}"),
            rolled_back: backed_up,
        };

        self.remove_incoming();
        // Failing before the backup exists means nothing live was changed.
        if backed_up && let Err(e) = self.backups.restore(&self.install_dir) {
            error!("Rollback failed, leaving pending-update marker in place: {e:#}");
            return Err(UpdateError::rollback(format!("{e:#} (after apply failure: {cause:#})")));
        }

        self.marker.clear().map_err(UpdateError::storage)?;
        warn!(version = %version, "Update rolled back");
        Ok(ApplyOutcome::RolledBack {
            error: apply_error,
        })
    }

    fn replace_installation(&self, package: &Path, backed_up: &mut bool) -> Result<()> {
        self.backups.create(&self.install_dir, &self.current_version)?;
        *backed_up = true;

        let incoming = self.sibling("incoming");
        let retired = self.sibling("retired");
        crate::utils::fs::remove_dir_all(&incoming)?;
        crate::utils::fs::remove_dir_all(&retired)?;

        extract_package(package, &incoming)?;

        std::fs::rename(&self.install_dir, &retired).with_context(|| {
            format!("Failed to move {} out of the way", self.install_dir.display())
        })?;
        std::fs::rename(&incoming, &self.install_dir).with_context(|| {
            format!("Failed to move the new version into {}", self.install_dir.display())
        })?;
        if let Err(e) = crate::utils::fs::remove_dir_all(&retired) {
            warn!("Failed to remove retired installation: {e:#}");
        }

        let entry = self.install_dir.join(&self.entry_point);
        if !entry.is_file() {
            bail!("The new installation has no entry point at {}", entry.display());
        }
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.install_dir.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{suffix}"));
        self.install_dir.with_file_name(name)
    }

    fn remove_incoming(&self) {
        if let Err(e) = crate::utils::fs::remove_dir_all(&self.sibling("incoming")) {
            warn!("Failed to remove extracted package: {e:#}");
        }
    }

    /// Rolls back an apply that was interrupted by a crash.
    ///
    /// # Errors
    ///
    /// [`UpdateError::RollbackError`] when the marker is present but the
    /// backup is missing, incomplete or cannot be restored. The marker stays.
    pub async fn recover_on_startup(&self) -> UpdateResult<StartupRecovery> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.recover_blocking())
            .await
            .map_err(|e| UpdateError::rollback(format!("recovery task panicked: {e}")))?
    }

    fn recover_blocking(&self) -> UpdateResult<StartupRecovery> {
        if !self.marker.exists() {
            return Ok(StartupRecovery::Clean);
        }

        let interrupted_version = match self.marker.read() {
            Ok(Some(marker)) => {
                warn!(
                    from = %marker.source_version,
                    to = %marker.target_version,
                    "Found interrupted update, rolling back"
                );
                Some(marker.target_version)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Found damaged pending-update marker, rolling back: {e:#}");
                None
            }
        };

        let record = self.backups.load().map_err(|e| {
            error!("Pending update marker present but no usable backup: {e:#}");
            UpdateError::rollback(format!("no usable backup to roll back to: {e:#}"))
        })?;

        self.backups.restore(&record.install_dir).map_err(|e| {
            error!("Startup rollback failed: {e:#}");
            UpdateError::rollback(format!("{e:#}"))
        })?;
        self.remove_incoming();
        if let Err(e) = crate::utils::fs::remove_dir_all(&self.sibling("retired")) {
            warn!("Failed to remove retired installation: {e:#}");
        }
        self.marker.clear().map_err(UpdateError::storage)?;

        info!(version = %record.source_version, "Interrupted update rolled back");
        Ok(StartupRecovery::RolledBack {
            restored_version: record.source_version,
            interrupted_version,
        })
    }

    /// Called once the browser started steadily; prunes the backup.
    ///
    /// Returns `false` while an apply is still pending, since the backup is
    /// the only way back.
    pub fn confirm_launch(&self) -> UpdateResult<bool> {
        if self.marker.exists() {
            warn!("Not pruning backup while an update is pending");
            return Ok(false);
        }
        self.backups.prune().map_err(UpdateError::storage)
    }
}

fn extract_package(package: &Path, destination: &Path) -> Result<()> {
    let file = std::fs::File::open(package)
        .with_context(|| format!("Failed to open package {}", package.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid package archive", package.display()))?;
    archive
        .extract(destination)
        .with_context(|| format!("Failed to extract package into {}", destination.display()))?;
    Ok(())
}
