//! Observer channels for update state.
//!
//! Observers either subscribe to the event stream (every state change and
//! progress sample, lossy for slow receivers) or watch the latest state.

use super::state::UpdateState;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::download::DownloadProgress;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    StateChanged(UpdateState),
    DownloadProgress(DownloadProgress),
}

#[derive(Debug, Clone)]
pub struct EventHub {
    events: broadcast::Sender<UpdateEvent>,
    state: watch::Sender<UpdateState>,
}

impl EventHub {
    #[must_use]
    pub fn new(initial: UpdateState) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(initial);
        Self {
            events,
            state,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    pub(crate) fn publish_state(&self, state: UpdateState) {
        self.state.send_replace(state.clone());
        // No subscribers is fine.
        let _ = self.events.send(UpdateEvent::StateChanged(state));
    }

    pub(crate) fn publish_progress(&self, progress: DownloadProgress) {
        let _ = self.events.send(UpdateEvent::DownloadProgress(progress));
    }
}
