//! Update state and its transition rules.

use crate::core::{UpdateError, UpdateResult};
use crate::manifest::Channel;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    #[default]
    Idle,
    Checking,
    Available,
    Downloading,
    Downloaded,
    Installing,
    Error,
}

impl UpdateStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Available => "available",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::Error => "error",
        }
    }

    /// A check, download or install is running. These statuses are not
    /// resumed after a restart.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Checking | Self::Available | Self::Downloading | Self::Installing)
    }

    const fn has_available_version(self) -> bool {
        matches!(self, Self::Available | Self::Downloading | Self::Downloaded | Self::Installing)
    }

    const fn has_progress(self) -> bool {
        matches!(self, Self::Downloading | Self::Downloaded)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The update lifecycle as observers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub status: UpdateStatus,
    pub channel: Channel,
    pub current_version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_version: Option<Version>,
    /// 0–100, only while downloading or downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<u8>,
    /// Epoch milliseconds of the last completed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl UpdateState {
    #[must_use]
    pub fn new(channel: Channel, current_version: Version) -> Self {
        Self {
            status: UpdateStatus::Idle,
            channel,
            current_version,
            available_version: None,
            download_progress: None,
            last_check_time: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Applies `transition`, or leaves the state untouched and fails when the
    /// current status does not allow it.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidTransition`].
    pub fn apply(&mut self, transition: Transition) -> UpdateResult<()> {
        use UpdateStatus::{Available, Checking, Downloaded, Downloading, Error, Idle, Installing};

        let allowed = match &transition {
            // `available` only lasts past a check when downloads are manual.
            Transition::BeginCheck => matches!(self.status, Idle | Error | Available),
            Transition::NoCandidate { .. } | Transition::CandidateFound { .. } => {
                self.status == Checking
            }
            Transition::BeginDownload => self.status == Available,
            Transition::Progress(_) | Transition::Downloaded => self.status == Downloading,
            Transition::BeginInstall => self.status == Downloaded,
            Transition::Failed { .. } => {
                matches!(self.status, Checking | Available | Downloading | Downloaded | Installing)
            }
            Transition::Interrupted { .. } => matches!(self.status, Idle | Error),
        };
        if !allowed {
            return Err(UpdateError::InvalidTransition {
                from: self.status,
                event: transition.name(),
            });
        }

        match transition {
            Transition::BeginCheck => {
                self.status = Checking;
                self.available_version = None;
                self.download_progress = None;
            }
            Transition::NoCandidate {
                at,
            } => {
                self.status = Idle;
                self.last_check_time = Some(at);
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            Transition::CandidateFound {
                version,
                at,
            } => {
                self.status = Available;
                self.available_version = Some(version);
                self.last_check_time = Some(at);
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            Transition::BeginDownload => {
                self.status = Downloading;
                self.download_progress = Some(0);
            }
            Transition::Progress(percent) => {
                self.download_progress = Some(percent.min(100));
            }
            Transition::Downloaded => {
                self.status = Downloaded;
                self.download_progress = Some(100);
            }
            Transition::BeginInstall => {
                self.status = Installing;
                self.download_progress = None;
            }
            Transition::Failed {
                message,
                at,
            }
            | Transition::Interrupted {
                message,
                at,
            } => {
                if self.status == Checking {
                    self.last_check_time = Some(at);
                }
                self.status = Error;
                self.available_version = None;
                self.download_progress = None;
                self.last_error = Some(message);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }

        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(())
    }

    /// Field-presence rules tied to the status.
    ///
    /// # Errors
    ///
    /// A description of the violated rule.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.download_progress.is_some() != self.status.has_progress() {
            return Err(format!(
                "downloadProgress must be set exactly while downloading or downloaded (status {})",
                self.status
            ));
        }
        if self.available_version.is_some() != self.status.has_available_version() {
            return Err(format!(
                "availableVersion must be set exactly while an update is pending (status {})",
                self.status
            ));
        }
        if self.download_progress.is_some_and(|p| p > 100) {
            return Err("downloadProgress exceeds 100".to_string());
        }
        Ok(())
    }

    /// Brings a state loaded from disk back to something a fresh process can
    /// continue from. Transient statuses fall back to idle.
    pub(crate) fn normalize_after_restart(&mut self, channel: Channel, current_version: Version) {
        if self.channel != channel || self.current_version != current_version {
            if self.status == UpdateStatus::Downloaded {
                self.status = UpdateStatus::Idle;
            }
            self.channel = channel;
            self.current_version = current_version;
        }

        if self.status.is_in_flight() {
            self.status = UpdateStatus::Idle;
        }

        match self.status {
            UpdateStatus::Downloaded => self.download_progress = Some(100),
            _ => {
                self.available_version = None;
                self.download_progress = None;
            }
        }
        if self.status == UpdateStatus::Downloaded && self.available_version.is_none() {
            self.status = UpdateStatus::Idle;
            self.download_progress = None;
        }
    }
}

/// Everything that can happen to an [`UpdateState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    BeginCheck,
    NoCandidate { at: u64 },
    CandidateFound { version: Version, at: u64 },
    BeginDownload,
    Progress(u8),
    Downloaded,
    BeginInstall,
    Failed { message: String, at: u64 },
    /// An install that a previous process left half done was rolled back.
    Interrupted { message: String, at: u64 },
}

impl Transition {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginCheck => "check for updates",
            Self::NoCandidate { .. } => "finish a check without a candidate",
            Self::CandidateFound { .. } => "report an available update",
            Self::BeginDownload => "start a download",
            Self::Progress(_) => "report download progress",
            Self::Downloaded => "finish a download",
            Self::BeginInstall => "install",
            Self::Failed { .. } => "record a failure",
            Self::Interrupted { .. } => "record an interrupted install",
        }
    }
}
