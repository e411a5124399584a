//! Download progress reporting.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One progress sample, as broadcast to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// 0–100. Stays at 0 while the total size is unknown.
    pub percent: u8,
    pub bytes_per_second: u64,
    pub transferred: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| self.transferred >= total)
    }
}

/// Coalesces raw chunk callbacks into at most one sample per `interval`.
///
/// The first sample and the completion sample are always emitted, so
/// observers see both ends of the transfer.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    started: Instant,
    last_emit: Option<Instant>,
    last_percent: Option<u8>,
}

impl ProgressThrottle {
    #[must_use]
    pub fn new(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            started,
            last_emit: None,
            last_percent: None,
        }
    }

    /// Returns a sample when one is due at `now`.
    pub fn update_at(
        &mut self,
        now: Instant,
        transferred: u64,
        total: Option<u64>,
    ) -> Option<DownloadProgress> {
        let percent = percent_of(transferred, total);
        let complete = total.is_some_and(|t| transferred >= t);

        let due = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        let finished_now = complete && self.last_percent != Some(100);
        if !due && !finished_now {
            return None;
        }

        self.last_emit = Some(now);
        self.last_percent = Some(percent);

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let bytes_per_second = if elapsed > 0.0 {
            (transferred as f64 / elapsed) as u64
        } else {
            0
        };

        Some(DownloadProgress {
            percent,
            bytes_per_second,
            transferred,
            total,
        })
    }
}

fn percent_of(transferred: u64, total: Option<u64>) -> u8 {
    match total {
        Some(0) => 100,
        Some(total) => ((transferred.min(total) as u128 * 100) / total as u128) as u8,
        None => 0,
    }
}
