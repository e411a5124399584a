//! Single-instance lock for the update agent.
//!
//! Two agents sharing a data directory would race on the state file and the
//! staging area, so every command that mutates them holds an [`AgentLock`].
//! The lock is an OS-level exclusive lock on `.locks/agent.lock` and is
//! released when the value is dropped (or the process dies).

use crate::core::{UpdateError, UpdateResult};
use anyhow::Context;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct AgentLock {
    file: File,
    path: PathBuf,
}

impl AgentLock {
    /// Takes the lock without waiting.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Busy`] when another agent holds the lock
    /// - [`UpdateError::IoError`] when the lock file cannot be created
    pub fn try_acquire(lock_path: &Path) -> UpdateResult<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create locks directory: {}", parent.display()))
                .map_err(UpdateError::storage)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
            .map_err(UpdateError::storage)?;

        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!(path = %lock_path.display(), "Agent lock acquired");
                Ok(Self {
                    file,
                    path: lock_path.to_path_buf(),
                })
            }
            Ok(false) => Err(UpdateError::Busy {
                operation: "another update agent is running".to_string(),
            }),
            Err(e) => Err(UpdateError::storage(
                anyhow::Error::new(e).context(format!("Failed to lock {}", lock_path.display())),
            )),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AgentLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {e}", self.path.display());
        }
    }
}
