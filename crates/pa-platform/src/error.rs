//! Platform integration errors.

use thiserror::Error;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Platform errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Platform feature not available.
    #[error("Platform feature not available: {0}")]
    Unavailable(String),

    /// Local storage error.
    #[error("Storage error: {0}")]
    Storage(String),
}
