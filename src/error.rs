//! Error types for the chore engine.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::TaskId;

/// Failure reported by one of the storage contracts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum ChoreError {
    /// Completing a task that is already completed.
    #[error("task {task} is already completed")]
    AlreadyCompleted { task: TaskId },

    /// Assignment attempted against an empty member or eligible pool.
    #[error("no household members available to assign task {task}")]
    NoCandidates { task: TaskId },

    /// Recurrence configuration could not be understood.
    #[error("malformed recurrence config: {reason}")]
    MalformedRecurrenceConfig { reason: String },

    #[error("task {task} not found")]
    TaskNotFound { task: TaskId },

    /// Date arithmetic left the representable calendar range.
    #[error("date arithmetic overflowed from {date}")]
    DateOutOfRange { date: NaiveDate },

    /// Engine configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ChoreError>;

impl ChoreError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ChoreError::MalformedRecurrenceConfig {
            reason: reason.into(),
        }
    }
}
