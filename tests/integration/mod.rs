//! Integration test suite for the Jubilee update agent
//!
//! End-to-end tests that drive the library through fake transports and a
//! manual clock, plus CLI tests against the built binary.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scenarios**: the reference update scenarios (available, up to date,
//!   tampered package, broken recovery, session round trip)
//! - **scheduling**: backoff, persisted schedule and restart behavior
//! - **install**: install, rollback and session hand-off through the machine
//! - **agent**: the background agent and its handle
//! - **cli**: the `jubilee-update` binary

mod agent;
mod cli;
mod install;
mod scenarios;
mod scheduling;
