//! Global constants used throughout the update agent.
//!
//! Timeouts, retry parameters, file names and other numeric constants that
//! are shared across modules live here so the magic numbers stay discoverable.

use std::time::Duration;

/// Manifest endpoint used when no configuration file overrides it.
pub const DEFAULT_UPDATE_ENDPOINT: &str = "https://updates.jubileebrowser.com/releases/manifest.json";

/// Default interval between successful update checks (4 hours).
pub const DEFAULT_CHECK_INTERVAL_HOURS: u64 = 4;

/// Delay before the first check after the agent starts (30 seconds).
pub const DEFAULT_INITIAL_DELAY_SECONDS: u64 = 30;

/// How often a downloaded update is re-announced while awaiting install.
pub const DEFAULT_APPLY_CHECK_INTERVAL_MINUTES: u64 = 15;

/// Starting delay for the check retry backoff (60 seconds).
pub const DEFAULT_RETRY_BASE_SECONDS: u64 = 60;

/// Upper bound for the check retry backoff (6 hours).
pub const DEFAULT_RETRY_MAX_SECONDS: u64 = 6 * 60 * 60;

/// Floor for any scheduled check; no two checks are closer than this.
pub const DEFAULT_MIN_CHECK_INTERVAL_SECONDS: u64 = 30;

/// The backoff doubles at most this many times.
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Timeout for a manifest fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;

/// Timeout for a whole package download.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECONDS: u64 = 15 * 60;

/// Minimum spacing between two download progress events.
pub const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(250);

/// Size ceiling of the update log before it is rotated (5 MiB).
pub const DEFAULT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Attempts made when restoring a backup over a locked installation.
pub const RESTORE_MAX_ATTEMPTS: u32 = 3;

/// Delay between restore attempts.
pub const RESTORE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// User agent sent with manifest and package requests.
pub const USER_AGENT: &str = concat!("jubilee-update/", env!("CARGO_PKG_VERSION"));

/// Environment variable pointing at an alternative agent configuration file.
pub const CONFIG_PATH_ENV: &str = "JUBILEE_UPDATE_CONFIG";

/// Environment variable overriding the agent data directory.
pub const DATA_DIR_ENV: &str = "JUBILEE_UPDATE_DATA_DIR";

/// Name of the per-user data directory.
pub const APP_DIR_NAME: &str = "jubilee-browser";

pub const CONFIG_FILE_NAME: &str = "update-agent.json";
pub const UPDATE_STATE_FILE_NAME: &str = "update-state.json";
pub const SESSION_STATE_FILE_NAME: &str = "session-state.json";
pub const PENDING_UPDATE_FILE_NAME: &str = "pending-update.json";
pub const STAGING_RECORD_FILE_NAME: &str = "staged.json";
pub const BACKUP_RECORD_FILE_NAME: &str = "backup.json";
pub const LOG_FILE_NAME: &str = "update.log";

/// Default executable checked after an apply to decide the new version launches.
#[cfg(windows)]
pub const DEFAULT_ENTRY_POINT: &str = "jubilee.exe";
#[cfg(not(windows))]
pub const DEFAULT_ENTRY_POINT: &str = "jubilee";
