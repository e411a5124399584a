//! The pending-update marker.
//!
//! Written before the installation is touched and removed once the swap is
//! complete or rolled back. Finding it at startup means the previous process
//! died mid-apply.

use crate::utils::fs::{read_json, remove_file_if_exists, write_json_atomic};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdateMarker {
    pub target_version: semver::Version,
    pub source_version: semver::Version,
    pub package_path: PathBuf,
    pub install_dir: PathBuf,
    /// Publisher certificate thumbprint the platform installer checks the package against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_thumbprint: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Presence alone signals an interrupted apply, even if the content is damaged.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn write(&self, marker: &PendingUpdateMarker) -> Result<()> {
        write_json_atomic(&self.path, marker)
    }

    pub fn read(&self) -> Result<Option<PendingUpdateMarker>> {
        read_json(&self.path)
    }

    pub fn clear(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}
