//! Jubilee Browser update agent
//!
//! Keeps a Jubilee Browser installation current without losing the user's
//! place: it checks a signed release manifest, downloads and verifies
//! packages, swaps them in with a backup to fall back on, and carries the
//! browsing session across the restart.
//!
//! # Architecture Overview
//!
//! ```text
//!  manifest ──► version ──► download ──► apply
//!  (fetch)      (policy)    (verify)     (swap / rollback)
//!        \          |           |          /
//!         └──────── update (state machine) ┘ ◄── session (snapshot / restore)
//! ```
//!
//! # Core Modules
//!
//! - [`manifest`] - release manifest fetching and parsing, update channels
//! - [`version`] - candidate selection under a channel policy
//! - [`download`] - streaming download, digest and signature verification, staging
//! - [`apply`] - backup, atomic swap, rollback and startup recovery
//! - [`session`] - session snapshots and restore plans
//! - [`update`] - the update state machine, its persistence and background agent
//!
//! ## Supporting Modules
//!
//! - [`config`] - agent configuration and on-disk layout
//! - [`core`] - error types
//! - [`logging`] - tracing setup with a rotating log file
//! - [`utils`] - filesystem helpers, single-instance lock, progress bars
//! - [`cli`] - the `jubilee-update` command line
//!
//! # Data Directory
//!
//! ```text
//! <data dir>/
//! ├── update-agent.json     # optional configuration
//! ├── update-state.json     # persisted UpdateState
//! ├── session-state.json    # last session snapshot
//! ├── pending-update.json   # present only while an apply is in progress
//! ├── staging/              # downloaded package and its record
//! ├── backup/               # previous installation
//! ├── logs/update.log
//! └── .locks/agent.lock
//! ```
//!
//! # Failure Handling
//!
//! Every failure except a failed rollback is recorded in the update state
//! and retried with exponential backoff. A failed rollback is fatal: the
//! pending-update marker stays and the user is told to reinstall.

pub mod apply;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod download;
pub mod logging;
pub mod manifest;
pub mod session;
pub mod update;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
