//! Time source and retry backoff.
//!
//! The state machine never sleeps. It computes the next wake-up as an epoch
//! millisecond value from a [`Clock`], and whoever drives it (the agent loop
//! or a test) decides how to wait. Tests use [`ManualClock`] and advance it
//! by hand.

use crate::constants::MAX_BACKOFF_EXPONENT;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_ms(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Exponential backoff for failed checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    /// No check is ever scheduled closer than this.
    pub floor: Duration,
}

impl RetryPolicy {
    /// `min(base * 2^min(failures, 6), max)`, raised to the floor.
    #[must_use]
    pub fn interval(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.min(MAX_BACKOFF_EXPONENT);
        let scaled = self.base.saturating_mul(1u32 << exponent);
        scaled.min(self.max).max(self.floor)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
