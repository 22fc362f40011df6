//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use exam_core::model::AnswerError;
use storage::repository::StorageError;

/// Errors emitted by the navigation controller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("question {index} out of range for {subject} ({len} questions)")]
    OutOfRange {
        subject: String,
        index: usize,
        len: usize,
    },
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("test has no questions")]
    Empty,
    #[error("test has not started yet (starts at {starts_at})")]
    NotStarted { starts_at: DateTime<Utc> },
    #[error("test ended at {ended_at}")]
    Expired { ended_at: DateTime<Utc> },
    #[error("test is still running until {ends_at}")]
    StillRunning { ends_at: DateTime<Utc> },
    #[error("session already submitted")]
    Submitted,
    #[error("submission failed: {0}")]
    Submission(#[source] StorageError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while reading engine configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {raw:?}")]
    Invalid { key: &'static str, raw: String },
}
