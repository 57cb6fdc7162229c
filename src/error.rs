//! Error types for lockq.

use thiserror::Error;

use crate::model::WorkId;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before entering the queue.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("work item not found: {0}")]
    NotFound(String),

    /// The wait ended; the work item itself is untouched.
    #[error("timed out waiting for work item {0}")]
    Timeout(WorkId),

    #[error("device reported failure for {id}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ActuationFailure { id: WorkId, reason: Option<String> },

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
