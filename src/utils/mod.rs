//! Filesystem, locking and terminal helpers shared across the agent.
//!
//! - [`fs`] - atomic writes, JSON files and directory copies
//! - [`lock`] - the single-instance agent lock
//! - [`progress`] - progress bars for the CLI

pub mod fs;
pub mod lock;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir};
pub use lock::AgentLock;
