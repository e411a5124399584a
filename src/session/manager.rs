use super::{BrowsingContext, RestorePlan, SessionCapture, SessionSnapshot};
use crate::core::{UpdateError, UpdateResult};
use crate::utils::fs::{read_json, write_json_atomic};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Owns `session-state.json`. The lifecycle hook is its only writer.
///
/// A startup that consumes the snapshot stamps `consumedAt`, so the session
/// is not re-applied on the following launch. A snapshot written for an
/// update (`pendingUpdate`) stays unconsumed until [`Self::acknowledge_upgrade`]
/// runs, so a crash during the first post-update launch restores it again.
#[derive(Debug, Clone)]
pub struct SessionManager {
    path: PathBuf,
}

impl SessionManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `capture` with a temp-file-and-rename replace.
    pub fn snapshot(
        &self,
        capture: SessionCapture,
        pending_update: bool,
    ) -> UpdateResult<SessionSnapshot> {
        let snapshot =
            SessionSnapshot::from_capture(capture, Utc::now().timestamp_millis(), pending_update);
        if let Err(reason) = snapshot.validate() {
            warn!("Persisting a session that will not restore cleanly: {reason}");
        }

        self.write(&snapshot)?;
        info!(tabs = snapshot.tabs.len(), pending_update, "Session snapshot written");
        Ok(snapshot)
    }

    /// Captures `context` and persists it.
    pub fn snapshot_context(
        &self,
        context: &impl BrowsingContext,
        pending_update: bool,
    ) -> UpdateResult<SessionSnapshot> {
        self.snapshot(context.capture(), pending_update)
    }

    /// Reads and validates the snapshot. Never modifies the file.
    ///
    /// Returns `None` when the file is missing, unparsable or structurally
    /// invalid; the browser then starts with an empty session.
    #[must_use]
    pub fn restore(&self) -> Option<SessionSnapshot> {
        let snapshot: SessionSnapshot = match read_json(&self.path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(path = %self.path.display(), "No session snapshot");
                return None;
            }
            Err(e) => {
                warn!("Discarding unreadable session snapshot: {e:#}");
                return None;
            }
        };

        match snapshot.validate() {
            Ok(()) => Some(snapshot),
            Err(reason) => {
                warn!("Discarding invalid session snapshot: {reason}");
                None
            }
        }
    }

    /// The once-per-launch read.
    ///
    /// Returns a plan for an unconsumed snapshot. Ordinary snapshots are
    /// marked consumed immediately; update snapshots wait for
    /// [`Self::acknowledge_upgrade`].
    pub fn take_for_startup(&self) -> UpdateResult<Option<RestorePlan>> {
        let Some(mut snapshot) = self.restore() else {
            return Ok(None);
        };

        if !snapshot.pending_update {
            if snapshot.consumed_at.is_some() {
                debug!("Session snapshot already consumed");
                return Ok(None);
            }
            snapshot.consumed_at = Some(Utc::now().timestamp_millis());
            self.write(&snapshot)?;
        }

        Ok(Some(snapshot.restore_plan()))
    }

    /// [`Self::take_for_startup`] followed by handing the plan to `context`.
    pub fn restore_into(&self, context: &mut impl BrowsingContext) -> UpdateResult<bool> {
        match self.take_for_startup()? {
            Some(plan) => {
                context.restore(&plan);
                info!(tabs = plan.tabs.len(), after_update = plan.after_update, "Session restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Called after the first steady launch on the new version.
    pub fn acknowledge_upgrade(&self) -> UpdateResult<()> {
        let Some(mut snapshot) = self.restore() else {
            return Ok(());
        };
        if !snapshot.pending_update {
            return Ok(());
        }

        snapshot.pending_update = false;
        snapshot.consumed_at = Some(Utc::now().timestamp_millis());
        self.write(&snapshot)?;
        info!("Upgrade acknowledged, session snapshot consumed");
        Ok(())
    }

    /// Drops the `pendingUpdate` flag without consuming the snapshot; used
    /// when an install was rolled back in-process.
    pub fn clear_pending_update(&self) -> UpdateResult<()> {
        let Some(mut snapshot) = self.restore() else {
            return Ok(());
        };
        if snapshot.pending_update {
            snapshot.pending_update = false;
            self.write(&snapshot)?;
        }
        Ok(())
    }

    fn write(&self, snapshot: &SessionSnapshot) -> UpdateResult<()> {
        write_json_atomic(&self.path, snapshot).map_err(UpdateError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{BrowsingMode, SessionTab, WindowBounds};
    use tempfile::TempDir;

    fn capture() -> SessionCapture {
        SessionCapture {
            window_bounds: WindowBounds {
                x: 0,
                y: 0,
                width: 1440,
                height: 900,
            },
            is_maximized: true,
            current_mode: BrowsingMode::JubileeBibles,
            tabs: vec![
                SessionTab {
                    id: "t1".into(),
                    url: "https://example.org/".into(),
                    title: "Example".into(),
                    mode: BrowsingMode::Internet,
                    is_active: false,
                },
                SessionTab {
                    id: "t2".into(),
                    url: "inspire://home".into(),
                    title: "Home".into(),
                    mode: BrowsingMode::JubileeBibles,
                    is_active: true,
                },
            ],
            active_tab_id: Some("t2".into()),
        }
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(temp.path().join("session-state.json"));

        let written = manager.snapshot(capture(), false).unwrap();
        let restored = manager.restore().unwrap();
        assert_eq!(restored, written);
        assert_eq!(manager.restore(), Some(restored));
    }

    #[test]
    fn test_missing_and_corrupt_files_restore_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session-state.json");
        let manager = SessionManager::new(&path);
        assert!(manager.restore().is_none());

        std::fs::write(&path, "{\"timestamp\": 1, \"tabs\": [").unwrap();
        assert!(manager.restore().is_none());

        std::fs::write(&path, r#"{"timestamp": 1}"#).unwrap();
        assert!(manager.restore().is_none());
    }

    #[test]
    fn test_take_for_startup_consumes_ordinary_snapshot() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(temp.path().join("session-state.json"));
        manager.snapshot(capture(), false).unwrap();

        let plan = manager.take_for_startup().unwrap().unwrap();
        assert!(!plan.after_update);
        assert_eq!(plan.active_tab_id.as_deref(), Some("t2"));
        assert!(manager.take_for_startup().unwrap().is_none());
    }

    #[test]
    fn test_update_snapshot_survives_until_acknowledged() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(temp.path().join("session-state.json"));
        manager.snapshot(capture(), true).unwrap();

        assert!(manager.take_for_startup().unwrap().unwrap().after_update);
        assert!(manager.take_for_startup().unwrap().unwrap().after_update);

        manager.acknowledge_upgrade().unwrap();
        assert!(manager.take_for_startup().unwrap().is_none());
        assert!(!manager.restore().unwrap().pending_update);
    }

    #[test]
    fn test_clear_pending_update_keeps_snapshot() {
        let temp = TempDir::new().unwrap();
        let manager = SessionManager::new(temp.path().join("session-state.json"));
        manager.snapshot(capture(), true).unwrap();

        manager.clear_pending_update().unwrap();
        let snapshot = manager.restore().unwrap();
        assert!(!snapshot.pending_update);
        assert!(snapshot.consumed_at.is_none());
    }
}
