//! File system utilities for the update agent.
//!
//! - **Atomic operations**: state files are written with temp-and-rename
//! - **Directory helpers**: recursive copy and tolerant removal used by
//!   staging, backup and the apply swap

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, read_json, remove_file_if_exists, write_json_atomic};
pub use self::dirs::{copy_dir, ensure_dir, remove_dir_all};
