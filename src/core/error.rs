//! Error handling for the update agent
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** ([`UpdateError`]) so the state machine can decide
//!    between "record and back off" and "surface as fatal"
//! 2. **User-friendly messages** ([`ErrorContext`]) with actionable suggestions
//!    for the CLI and for the `lastError` field shown in the browser UI
//!
//! # Error Categories
//!
//! - **Check path**: [`UpdateError::NetworkError`], [`UpdateError::ManifestFormatError`]
//! - **Download path**: [`UpdateError::TransferError`], [`UpdateError::IntegrityError`],
//!   [`UpdateError::SignatureError`]
//! - **Install path**: [`UpdateError::ApplyError`] (rolled back automatically) and
//!   [`UpdateError::RollbackError`], the only fatal error
//!
//! Everything except `RollbackError` is recoverable: the machine moves to
//! `error`, stores [`UpdateError::user_message`] as `lastError`, and schedules
//! the next check with backoff.

use crate::update::UpdateStatus;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update agent operations.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The manifest host could not be reached, timed out, or answered with a
    /// non-success status.
    #[error("Network error: {operation}")]
    NetworkError {
        /// The network operation that failed
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// The manifest payload is not a valid newest-first release list.
    #[error("Malformed release manifest: {reason}")]
    ManifestFormatError {
        /// What made the manifest unusable
        reason: String,
    },

    /// The staged package does not hash to the digest the manifest promised.
    #[error("Integrity check failed for {package}: expected {expected}, got {actual}")]
    IntegrityError {
        /// Package file name
        package: String,
        /// Digest from the manifest
        expected: String,
        /// Digest computed over the staged bytes
        actual: String,
    },

    /// A signature was required and is missing, undecodable or invalid.
    #[error("Signature verification failed: {reason}")]
    SignatureError {
        /// Why the signature was rejected
        reason: String,
    },

    /// The package download was interrupted or truncated.
    #[error("Download interrupted: {reason}")]
    TransferError {
        /// What interrupted the transfer
        reason: String,
    },

    /// The update was not installed. Either it was refused before anything
    /// changed, or the swap failed and the backup was restored.
    #[error("Failed to apply update {version}: {reason}")]
    ApplyError {
        /// Version that was being installed
        version: String,
        /// Why the apply failed
        reason: String,
        /// The installation was touched and then restored from backup
        rolled_back: bool,
    },

    /// Rollback could not restore the previous installation.
    #[error("Rollback failed: {reason}")]
    RollbackError {
        /// Why the backup could not be restored
        reason: String,
    },

    /// The agent configuration is invalid.
    #[error("Invalid configuration: {reason}")]
    ConfigError {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Another check, download or agent instance is already running.
    #[error("Update already in progress: {operation}")]
    Busy {
        /// The operation that was refused
        operation: String,
    },

    /// A transition was requested that the current status does not allow.
    #[error("Cannot {event} while update status is {from}")]
    InvalidTransition {
        /// Status at the time of the request
        from: UpdateStatus,
        /// Requested transition
        event: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Semver parsing error
    #[error("Semver parsing error: {0}")]
    SemverError(#[from] semver::Error),
}

impl UpdateError {
    /// `true` only for [`UpdateError::RollbackError`]; the installation may be
    /// broken and nothing can fix it automatically.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackError { .. })
    }

    /// Short message suitable for the `lastError` field and UI notifications.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkError {
                operation,
                reason,
            } => format!("Could not reach the update server ({operation}): {reason}"),
            Self::ManifestFormatError {
                reason,
            } => format!("The update server returned an invalid release list: {reason}"),
            Self::IntegrityError {
                package,
                ..
            } => format!(
                "Integrity check failed: the downloaded package {package} does not match its published digest"
            ),
            Self::SignatureError {
                reason,
            } => format!("The update package signature could not be verified: {reason}"),
            Self::TransferError {
                reason,
            } => format!("The update download was interrupted: {reason}"),
            Self::ApplyError {
                version,
                reason,
                rolled_back: true,
            } => format!(
                "Installing version {version} failed and the previous version was restored: {reason}"
            ),
            Self::ApplyError {
                version,
                reason,
                rolled_back: false,
            } => format!("Version {version} was not installed: {reason}"),
            Self::RollbackError {
                reason,
            } => format!(
                "The previous version could not be restored. Please reinstall Jubilee Browser. ({reason})"
            ),
            other => other.to_string(),
        }
    }

    pub(crate) fn network(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::NetworkError {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn manifest(reason: impl Into<String>) -> Self {
        Self::ManifestFormatError {
            reason: reason.into(),
        }
    }

    pub(crate) fn transfer(reason: impl fmt::Display) -> Self {
        Self::TransferError {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn signature(reason: impl Into<String>) -> Self {
        Self::SignatureError {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }

    pub(crate) fn rollback(reason: impl fmt::Display) -> Self {
        Self::RollbackError {
            reason: reason.to_string(),
        }
    }

    /// Wraps a failure from the `anyhow`-based filesystem helpers, keeping
    /// the io error kind when there is one.
    pub(crate) fn storage(error: anyhow::Error) -> Self {
        let kind = error
            .chain()
            .find_map(|e| e.downcast_ref::<std::io::Error>())
            .map_or(std::io::ErrorKind::Other, std::io::Error::kind);
        Self::IoError(std::io::Error::new(kind, format!("{error:#}")))
    }
}

/// An error with user-facing details and a suggestion, rendered by the CLI.
///
/// ```rust,no_run
/// use jubilee_update::core::{ErrorContext, UpdateError};
///
/// let context = ErrorContext::new(UpdateError::RollbackError {
///     reason: "backup missing".to_string(),
/// })
/// .with_suggestion("Reinstall Jubilee Browser from the official installer");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        let label = if self.error.is_fatal() {
            "fatal".red().bold().reversed()
        } else {
            "error".red().bold()
        };
        eprintln!("{}: {}", label, self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`UpdateError`] (directly or anywhere in the `anyhow` chain)
/// and [`std::io::Error`]; everything else is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()) {
        return create_error_context(update_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(UpdateError::IoError(std::io::Error::new(
            io_error.kind(),
            io_error.to_string(),
        )))
        .with_suggestion(
            "Check that the installation and data directories are writable by the current user",
        );
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::ConfigError {
        reason: message,
    })
}

fn create_error_context(error: &UpdateError) -> ErrorContext {
    let rebuilt = rebuild(error);
    match error {
        UpdateError::NetworkError {
            reason,
            ..
        } => ErrorContext::new(rebuilt)
            .with_details(reason.clone())
            .with_suggestion("Check your internet connection; the agent retries automatically"),
        UpdateError::ManifestFormatError {
            ..
        } => ErrorContext::new(rebuilt)
            .with_suggestion("Verify the updateEndpoint in the agent configuration"),
        UpdateError::IntegrityError {
            ..
        }
        | UpdateError::SignatureError {
            ..
        } => ErrorContext::new(rebuilt)
            .with_details("The package was discarded and nothing was installed")
            .with_suggestion("Run `jubilee-update download` again later"),
        UpdateError::TransferError {
            ..
        } => ErrorContext::new(rebuilt)
            .with_suggestion("Run `jubilee-update download` again to restart the download"),
        UpdateError::ApplyError {
            rolled_back: true,
            ..
        } => ErrorContext::new(rebuilt)
            .with_details("The previous installation was restored from backup"),
        UpdateError::ApplyError {
            rolled_back: false,
            ..
        } => ErrorContext::new(rebuilt).with_details("The installation was not changed"),
        UpdateError::RollbackError {
            ..
        } => ErrorContext::new(rebuilt)
            .with_details(
                "The installation may be incomplete. The pending-update marker was left in place",
            )
            .with_suggestion("Reinstall Jubilee Browser from the official installer"),
        UpdateError::ConfigError {
            ..
        } => ErrorContext::new(rebuilt)
            .with_suggestion("Fix the agent configuration file or pass --config with a valid file"),
        UpdateError::Busy {
            ..
        } => ErrorContext::new(rebuilt)
            .with_suggestion("Wait for the running update to finish and try again"),
        _ => ErrorContext::new(rebuilt),
    }
}

/// `UpdateError` holds non-cloneable sources, so the CLI rebuilds a
/// message-equivalent value.
fn rebuild(error: &UpdateError) -> UpdateError {
    match error {
        UpdateError::NetworkError {
            operation,
            reason,
        } => UpdateError::NetworkError {
            operation: operation.clone(),
            reason: reason.clone(),
        },
        UpdateError::ManifestFormatError {
            reason,
        } => UpdateError::manifest(reason.clone()),
        UpdateError::IntegrityError {
            package,
            expected,
            actual,
        } => UpdateError::IntegrityError {
            package: package.clone(),
            expected: expected.clone(),
            actual: actual.clone(),
        },
        UpdateError::SignatureError {
            reason,
        } => UpdateError::signature(reason.clone()),
        UpdateError::TransferError {
            reason,
        } => UpdateError::transfer(reason),
        UpdateError::ApplyError {
            version,
            reason,
            rolled_back,
        } => UpdateError::ApplyError {
            version: version.clone(),
            reason: reason.clone(),
            rolled_back: *rolled_back,
        },
        UpdateError::RollbackError {
            reason,
        } => UpdateError::rollback(reason),
        UpdateError::ConfigError {
            reason,
        } => UpdateError::config(reason.clone()),
        UpdateError::Busy {
            operation,
        } => UpdateError::Busy {
            operation: operation.clone(),
        },
        UpdateError::InvalidTransition {
            from,
            event,
        } => UpdateError::InvalidTransition {
            from: *from,
            event: *event,
        },
        UpdateError::IoError(e) => UpdateError::IoError(std::io::Error::new(e.kind(), e.to_string())),
        other => UpdateError::config(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rollback_is_fatal() {
        assert!(UpdateError::rollback("backup missing").is_fatal());
        assert!(!UpdateError::transfer("reset by peer").is_fatal());
        assert!(
            !UpdateError::ApplyError {
                version: "8.0.5".into(),
                reason: "disk full".into(),
                rolled_back: true,
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_integrity_user_message_mentions_integrity() {
        let error = UpdateError::IntegrityError {
            package: "jubilee-8.0.5.zip".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(error.user_message().to_lowercase().contains("integrity"));
    }

    #[test]
    fn test_apply_message_only_claims_restore_after_rollback() {
        let refused = UpdateError::ApplyError {
            version: "8.0.5".into(),
            reason: "the staged package has not been verified".into(),
            rolled_back: false,
        };
        assert_eq!(
            refused.user_message(),
            "Version 8.0.5 was not installed: the staged package has not been verified"
        );

        let restored = UpdateError::ApplyError {
            version: "8.0.5".into(),
            reason: "no entry point".into(),
            rolled_back: true,
        };
        assert!(restored.user_message().contains("the previous version was restored"));
    }

    #[test]
    fn test_user_friendly_error_finds_update_error_in_chain() {
        let error = anyhow::Error::new(UpdateError::rollback("backup.json missing"))
            .context("startup recovery failed");
        let context = user_friendly_error(error);

        assert!(context.error.is_fatal());
        assert!(context.suggestion.unwrap().contains("Reinstall"));
    }

    #[test]
    fn test_user_friendly_error_generic_includes_chain() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let context = user_friendly_error(error);
        let rendered = context.to_string();

        assert!(rendered.contains("outer"));
        assert!(rendered.contains("root cause"));
    }

    #[test]
    fn test_error_context_display() {
        let context = ErrorContext::new(UpdateError::transfer("connection reset"))
            .with_details("partial file removed")
            .with_suggestion("retry");
        let rendered = context.to_string();

        assert!(rendered.contains("Download interrupted: connection reset"));
        assert!(rendered.contains("Details: partial file removed"));
        assert!(rendered.contains("Suggestion: retry"));
    }
}
