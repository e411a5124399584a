//! Terminal progress indicators for the CLI.
//!
//! Indicators are hidden when `JUBILEE_UPDATE_NO_PROGRESS` is set (the
//! `--no-progress` flag sets it), so scripted use gets clean output.

use crate::download::DownloadProgress;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use std::time::Duration;

pub const NO_PROGRESS_ENV: &str = "JUBILEE_UPDATE_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({msg})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

/// Byte-level bar fed from [`DownloadProgress`] samples.
#[derive(Clone)]
pub struct DownloadBar {
    inner: IndicatifBar,
}

impl DownloadBar {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let inner = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(0);
            bar.set_style(download_style());
            bar
        };
        inner.set_prefix(label.into());
        Self {
            inner,
        }
    }

    pub fn update(&self, progress: &DownloadProgress) {
        if let Some(total) = progress.total {
            self.inner.set_length(total);
        }
        self.inner.set_position(progress.transferred);
        self.inner.set_message(format!("{}/s", indicatif::HumanBytes(progress.bytes_per_second)));
    }

    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}

/// Spinner for steps with no measurable progress.
#[must_use]
pub fn spinner(message: impl Into<String>) -> IndicatifBar {
    if is_progress_disabled() {
        return IndicatifBar::hidden();
    }
    let bar = IndicatifBar::new_spinner();
    bar.set_style(spinner_style());
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
