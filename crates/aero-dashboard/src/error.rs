//! Dashboard error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] aero_core::CoreError),

    #[error("Live window of {window} exceeds broadcast capacity of {capacity}")]
    WindowExceedsCapacity { window: usize, capacity: usize },

    #[error("Server task failed: {0}")]
    Task(String),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
