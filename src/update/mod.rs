//! The update state machine and its background agent.
//!
//! ```text
//!          ┌──────────── no candidate ───────────┐
//!          ▼                                     │
//!   idle ──► checking ──► available ──► downloading ──► downloaded ──► installing
//!    ▲          │             │              │              │              │
//!    │          └─────────────┴──────┬───────┴──────────────┴──────────────┘
//!    │                               ▼
//!    └────────── retry (backoff) ── error
//! ```
//!
//! [`UpdateMachine`] holds the [`UpdateState`] and performs each step;
//! [`UpdateAgent`] drives it on a timer and serializes manual requests.
//! Observers use the [`EventHub`].

mod agent;
mod events;
mod machine;
mod schedule;
mod state;
mod store;

pub use agent::{AgentHandle, UpdateAgent};
pub use events::{EventHub, UpdateEvent};
pub use machine::{InstallOutcome, MachineSettings, UpdateMachine};
pub use schedule::{Clock, ManualClock, RetryPolicy, SystemClock};
pub use state::{Transition, UpdateState, UpdateStatus};
pub use store::UpdateStore;
