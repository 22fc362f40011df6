use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use exam_core::model::QuestionId;

/// How a notice should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational; the test continues.
    Transient,
    /// Requires the candidate's attention before anything else.
    Blocking,
}

/// User-facing events raised by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SyncDeferred { question_id: QuestionId, reason: String },
    SyncRecovered { question_id: QuestionId },
    ClockDegraded { reason: String },
    Expired { ended_at: DateTime<Utc> },
    SubmissionFailed { reason: String },
    Submitted { redirect_after: Duration },
}

impl Notice {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::Expired { .. } | Self::SubmissionFailed { .. } | Self::Submitted { .. } => {
                Severity::Blocking
            }
            Self::SyncDeferred { .. } | Self::SyncRecovered { .. } | Self::ClockDegraded { .. } => {
                Severity::Transient
            }
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyncDeferred { question_id, reason } => write!(
                f,
                "Answer to {question_id} saved locally, will retry ({reason})"
            ),
            Self::SyncRecovered { question_id } => write!(f, "Answer to {question_id} saved"),
            Self::ClockDegraded { reason } => {
                write!(f, "Using device time, server clock unavailable ({reason})")
            }
            Self::Expired { ended_at } => write!(f, "Time is up (ended {ended_at})"),
            Self::SubmissionFailed { reason } => {
                write!(f, "Submission failed, please retry ({reason})")
            }
            Self::Submitted { redirect_after } => write!(
                f,
                "Test submitted, leaving in {}s",
                redirect_after.as_secs()
            ),
        }
    }
}
