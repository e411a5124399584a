use super::state::UpdateState;
use crate::core::{UpdateError, UpdateResult};
use crate::manifest::Channel;
use crate::utils::fs::{read_json, write_json_atomic};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persists [`UpdateState`] to `update-state.json`.
#[derive(Debug, Clone)]
pub struct UpdateStore {
    path: PathBuf,
}

impl UpdateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted state, normalized for a fresh process.
    ///
    /// A missing or corrupt file yields a fresh idle state.
    #[must_use]
    pub fn load(&self, channel: Channel, current_version: semver::Version) -> UpdateState {
        match self.read() {
            Ok(Some(mut state)) => {
                state.normalize_after_restart(channel, current_version);
                debug!(status = %state.status, "Loaded persisted update state");
                state
            }
            Ok(None) => UpdateState::new(channel, current_version),
            Err(e) => {
                warn!("Discarding unreadable update state: {e}");
                UpdateState::new(channel, current_version)
            }
        }
    }

    /// The file as written, without normalization.
    pub fn read(&self) -> UpdateResult<Option<UpdateState>> {
        read_json(&self.path).map_err(UpdateError::storage)
    }

    pub fn save(&self, state: &UpdateState) -> UpdateResult<()> {
        write_json_atomic(&self.path, state).map_err(UpdateError::storage)
    }
}
