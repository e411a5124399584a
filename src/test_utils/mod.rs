//! Test utilities for the update agent
//!
//! In-memory transports and fixtures so the state machine, download pipeline
//! and apply controller can be exercised without a network or a real
//! browser installation.
//!
//! # Example
//!
//! ```rust,no_run
//! use jubilee_update::test_utils::{FakeReleaseSource, TestEnvironment, release};
//!
//! let env = TestEnvironment::new();
//! let releases = FakeReleaseSource::new(vec![release("8.0.5", "https://cdn.example.org/a.zip", "00")]);
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakePackageSource, FakeReleaseSource};
pub use fixtures::{TestEnvironment, build_package, release, sample_capture, sha256_hex};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither set nothing
/// is logged. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=jubilee_update=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
