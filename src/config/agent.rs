//! The agent configuration file.

use super::paths::AgentPaths;
use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_APPLY_CHECK_INTERVAL_MINUTES, DEFAULT_CHECK_INTERVAL_HOURS,
    DEFAULT_DOWNLOAD_TIMEOUT_SECONDS, DEFAULT_ENTRY_POINT, DEFAULT_FETCH_TIMEOUT_SECONDS,
    DEFAULT_INITIAL_DELAY_SECONDS, DEFAULT_LOG_MAX_BYTES, DEFAULT_MIN_CHECK_INTERVAL_SECONDS,
    DEFAULT_RETRY_BASE_SECONDS, DEFAULT_RETRY_MAX_SECONDS, DEFAULT_UPDATE_ENDPOINT,
};
use crate::core::{UpdateError, UpdateResult};
use crate::download::SignatureVerifier;
use crate::manifest::{Channel, ensure_secure_url};
use crate::update::RetryPolicy;
use crate::version::ChannelPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Settings for the update agent.
///
/// Stored as camelCase JSON. Every field has a default, so an absent file or
/// a file that sets only `channel` are both valid:
///
/// ```json
/// {
///   "updateEndpoint": "https://updates.jubileebrowser.com/releases/manifest.json",
///   "channel": "beta",
///   "checkIntervalHours": 4,
///   "signaturePublicKeyPem": "-----BEGIN PUBLIC KEY-----\n...\n-----END PUBLIC KEY-----"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// HTTPS URL of the release manifest.
    pub update_endpoint: String,
    pub channel: Channel,
    /// Interval between successful checks.
    pub check_interval_hours: u64,
    /// Delay before the first check after start.
    pub initial_delay_seconds: u64,
    /// How often a downloaded but not yet installed update is announced again.
    pub apply_check_interval_minutes: u64,
    /// SHA-1 or SHA-256 thumbprint of the publisher certificate. Checked by
    /// the platform installer, recorded in the pending-update marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_certificate_thumbprint: Option<String>,
    /// Ed25519 public key (SPKI PEM). When set, every package must carry a
    /// valid signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_public_key_pem: Option<String>,
    pub allow_downgrade: bool,
    pub allow_prerelease: bool,
    pub retry_base_seconds: u64,
    pub retry_max_seconds: u64,
    pub min_check_interval_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub download_timeout_seconds: u64,
    /// Installation directory. Defaults to the directory of the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    /// Executable, relative to the installation directory, that must exist after an apply.
    pub entry_point: String,
    /// Directory holding state files, staging, backup and logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub log_max_bytes: u64,
    /// Version of the installed browser. Defaults to this agent's own version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<semver::Version>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            update_endpoint: DEFAULT_UPDATE_ENDPOINT.to_string(),
            channel: Channel::Stable,
            check_interval_hours: DEFAULT_CHECK_INTERVAL_HOURS,
            initial_delay_seconds: DEFAULT_INITIAL_DELAY_SECONDS,
            apply_check_interval_minutes: DEFAULT_APPLY_CHECK_INTERVAL_MINUTES,
            expected_certificate_thumbprint: None,
            signature_public_key_pem: None,
            allow_downgrade: false,
            allow_prerelease: false,
            retry_base_seconds: DEFAULT_RETRY_BASE_SECONDS,
            retry_max_seconds: DEFAULT_RETRY_MAX_SECONDS,
            min_check_interval_seconds: DEFAULT_MIN_CHECK_INTERVAL_SECONDS,
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECONDS,
            download_timeout_seconds: DEFAULT_DOWNLOAD_TIMEOUT_SECONDS,
            install_dir: None,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            data_dir: None,
            log_max_bytes: DEFAULT_LOG_MAX_BYTES,
            current_version: None,
        }
    }
}

impl AgentConfig {
    /// Loads and validates the configuration.
    ///
    /// Resolution order: `explicit` (must exist), then the file named by
    /// `JUBILEE_UPDATE_CONFIG`, then `update-agent.json` in the data
    /// directory. A missing implicit file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails when the explicit file is missing, any file cannot be read or
    /// parsed, or [`AgentConfig::validate`] rejects the result.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = if let Some(path) = explicit {
            Self::load_from(path).await?
        } else {
            let path = match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => PathBuf::from(path),
                None => Self::default_path()?,
            };
            if fs::try_exists(&path).await.unwrap_or(false) {
                Self::load_from(&path).await?
            } else {
                debug!(path = %path.display(), "No agent configuration file, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads one configuration file without validating it.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read agent config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            UpdateError::config(format!("{} is not a valid agent config: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded agent configuration");
        Ok(config)
    }

    /// `update-agent.json` inside the default data directory.
    pub fn default_path() -> Result<PathBuf> {
        Ok(AgentPaths::default_data_dir()?.join(crate::constants::CONFIG_FILE_NAME))
    }

    /// Rejects settings the agent cannot run with.
    ///
    /// # Errors
    ///
    /// [`UpdateError::ConfigError`] naming the offending field.
    pub fn validate(&self) -> UpdateResult<()> {
        ensure_secure_url(&self.update_endpoint).map_err(|e| {
            UpdateError::config(format!("updateEndpoint: {}", reason_of(&e)))
        })?;

        for (field, value) in [
            ("checkIntervalHours", self.check_interval_hours),
            ("applyCheckIntervalMinutes", self.apply_check_interval_minutes),
            ("retryBaseSeconds", self.retry_base_seconds),
            ("fetchTimeoutSeconds", self.fetch_timeout_seconds),
            ("downloadTimeoutSeconds", self.download_timeout_seconds),
            ("logMaxBytes", self.log_max_bytes),
        ] {
            if value == 0 {
                return Err(UpdateError::config(format!("{field} must be greater than zero")));
            }
        }

        if self.retry_max_seconds < self.retry_base_seconds {
            return Err(UpdateError::config(format!(
                "retryMaxSeconds ({}) must not be below retryBaseSeconds ({})",
                self.retry_max_seconds, self.retry_base_seconds
            )));
        }

        if self.entry_point.trim().is_empty() {
            return Err(UpdateError::config("entryPoint must not be empty"));
        }

        if let Some(raw) = &self.expected_certificate_thumbprint
            && normalize_thumbprint(raw).is_none()
        {
            return Err(UpdateError::config(
                "expectedCertificateThumbprint must be 40 or 64 hex characters",
            ));
        }

        self.signature_verifier()?;
        Ok(())
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }

    #[must_use]
    pub fn apply_check_interval(&self) -> Duration {
        Duration::from_secs(self.apply_check_interval_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    #[must_use]
    pub const fn channel_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            allow_downgrade: self.allow_downgrade,
            allow_prerelease: self.allow_prerelease,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_secs(self.retry_base_seconds),
            max: Duration::from_secs(self.retry_max_seconds),
            floor: Duration::from_secs(self.min_check_interval_seconds),
        }
    }

    /// The package signature verifier, if a public key is configured.
    pub fn signature_verifier(&self) -> UpdateResult<Option<SignatureVerifier>> {
        self.signature_public_key_pem
            .as_deref()
            .filter(|pem| !pem.trim().is_empty())
            .map(SignatureVerifier::from_pem)
            .transpose()
    }

    pub fn current_version(&self) -> UpdateResult<semver::Version> {
        match &self.current_version {
            Some(version) => Ok(version.clone()),
            None => Ok(semver::Version::parse(env!("CARGO_PKG_VERSION"))?),
        }
    }

    /// Thumbprint as uppercase hex without separators.
    #[must_use]
    pub fn certificate_thumbprint(&self) -> Option<String> {
        self.expected_certificate_thumbprint.as_deref().and_then(normalize_thumbprint)
    }

    /// The configured installation directory, or the running executable's directory.
    pub fn install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.install_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("Executable {} has no parent directory", exe.display()))
    }

    pub fn paths(&self) -> Result<AgentPaths> {
        match &self.data_dir {
            Some(dir) => Ok(AgentPaths::new(dir)),
            None => Ok(AgentPaths::new(AgentPaths::default_data_dir()?)),
        }
    }
}

fn reason_of(error: &UpdateError) -> String {
    match error {
        UpdateError::ConfigError {
            reason,
        } => reason.clone(),
        other => other.to_string(),
    }
}

/// Strips `:`/space separators; accepts SHA-1 (40) and SHA-256 (64) lengths.
fn normalize_thumbprint(raw: &str) -> Option<String> {
    let hex: String = raw.chars().filter(|c| !matches!(c, ':' | ' ')).collect();
    let valid = matches!(hex.len(), 40 | 64) && hex.chars().all(|c| c.is_ascii_hexdigit());
    valid.then(|| hex.to_ascii_uppercase())
}
