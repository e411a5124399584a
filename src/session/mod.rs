//! Session continuity across update restarts.
//!
//! Before an install the browser's tabs, window geometry and browsing mode
//! are written to `session-state.json`; the next launch reads the snapshot
//! back and recreates the session. The browser shell itself is reached only
//! through [`BrowsingContext`].

mod manager;

pub use manager::SessionManager;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which of the two isolated browsing contexts a tab or window belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowsingMode {
    #[default]
    Internet,
    JubileeBibles,
}

impl fmt::Display for BrowsingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internet => f.write_str("internet"),
            Self::JubileeBibles => f.write_str("jubileebibles"),
        }
    }
}

/// Window position and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A tab as stored in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTab {
    pub id: String,
    pub url: String,
    pub title: String,
    pub mode: BrowsingMode,
    pub is_active: bool,
}

/// What the browser shell hands over when a session is captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapture {
    pub window_bounds: WindowBounds,
    pub is_maximized: bool,
    pub current_mode: BrowsingMode,
    pub tabs: Vec<SessionTab>,
    #[serde(default)]
    pub active_tab_id: Option<String>,
}

/// The persisted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Epoch milliseconds at capture time.
    pub timestamp: i64,
    pub window_bounds: WindowBounds,
    pub is_maximized: bool,
    pub current_mode: BrowsingMode,
    pub tabs: Vec<SessionTab>,
    pub active_tab_id: Option<String>,
    /// Set right before an install; tells the next launch to finish upgrade bookkeeping.
    pub pending_update: bool,
    /// Epoch milliseconds at which a startup consumed the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<i64>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn from_capture(capture: SessionCapture, timestamp: i64, pending_update: bool) -> Self {
        Self {
            timestamp,
            window_bounds: capture.window_bounds,
            is_maximized: capture.is_maximized,
            current_mode: capture.current_mode,
            tabs: capture.tabs,
            active_tab_id: capture.active_tab_id,
            pending_update,
            consumed_at: None,
        }
    }

    /// Checks the structural rules a restorable snapshot must satisfy.
    ///
    /// # Errors
    ///
    /// A description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_bounds.width <= 0 || self.window_bounds.height <= 0 {
            return Err(format!(
                "window size {}x{} is not positive",
                self.window_bounds.width, self.window_bounds.height
            ));
        }

        let mut seen = HashSet::new();
        for tab in &self.tabs {
            if tab.id.trim().is_empty() {
                return Err("a tab has an empty id".to_string());
            }
            if !seen.insert(tab.id.as_str()) {
                return Err(format!("tab id '{}' appears twice", tab.id));
            }
        }

        let mut active = self.tabs.iter().filter(|tab| tab.is_active);
        let flagged = active.next();
        if active.next().is_some() {
            return Err("more than one tab is marked active".to_string());
        }

        if let Some(id) = &self.active_tab_id {
            if !seen.contains(id.as_str()) {
                return Err(format!("activeTabId '{id}' does not name a tab"));
            }
            if let Some(tab) = flagged
                && &tab.id != id
            {
                return Err(format!("activeTabId '{id}' disagrees with active tab '{}'", tab.id));
            }
        }

        Ok(())
    }

    /// The tab to focus: `activeTabId`, else the flagged tab, else the first.
    #[must_use]
    pub fn effective_active_tab(&self) -> Option<&str> {
        self.active_tab_id
            .as_deref()
            .or_else(|| self.tabs.iter().find(|tab| tab.is_active).map(|tab| tab.id.as_str()))
            .or_else(|| self.tabs.first().map(|tab| tab.id.as_str()))
    }

    #[must_use]
    pub fn restore_plan(&self) -> RestorePlan {
        RestorePlan {
            window_bounds: self.window_bounds,
            is_maximized: self.is_maximized,
            current_mode: self.current_mode,
            tabs: self.tabs.clone(),
            active_tab_id: self.effective_active_tab().map(str::to_string),
            after_update: self.pending_update,
        }
    }
}

/// Instructions for the browser shell to recreate a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub window_bounds: WindowBounds,
    pub is_maximized: bool,
    pub current_mode: BrowsingMode,
    /// In display order.
    pub tabs: Vec<SessionTab>,
    pub active_tab_id: Option<String>,
    /// The previous run ended in an update restart.
    pub after_update: bool,
}

/// The tab/window/session side of the browser shell.
pub trait BrowsingContext {
    fn capture(&self) -> SessionCapture;

    /// Recreates tabs in order and focuses `plan.active_tab_id`.
    fn restore(&mut self, plan: &RestorePlan);
}
