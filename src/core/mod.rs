//! Core types shared by every update agent module.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};

/// Result alias for operations that fail with a typed [`UpdateError`].
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;
