//! Error types for aero-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid live buffer capacity: {0}")]
    InvalidCapacity(usize),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
