use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use exam_core::model::{TestId, UserId};
use storage::repository::SubmissionRepository;
use tracing::{info, instrument, warn};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    InProgress,
    Submitted(SubmitOutcome),
}

/// Acknowledged submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub submitted_at: DateTime<Utc>,
    /// Delay before the UI leaves the test screen.
    pub redirect_after: Duration,
    /// Submitted by the timer rather than by the candidate.
    pub forced: bool,
}

/// Finalizes an attempt server-side, once.
pub struct SubmissionController {
    user_id: UserId,
    test_id: TestId,
    submissions: Arc<dyn SubmissionRepository>,
    redirect_delay: Duration,
    state: SubmissionState,
}

impl SubmissionController {
    #[must_use]
    pub fn new(
        user_id: UserId,
        test_id: TestId,
        submissions: Arc<dyn SubmissionRepository>,
        redirect_delay: Duration,
    ) -> Self {
        Self {
            user_id,
            test_id,
            submissions,
            redirect_delay,
            state: SubmissionState::InProgress,
        }
    }

    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    #[must_use]
    pub fn outcome(&self) -> Option<SubmitOutcome> {
        match self.state {
            SubmissionState::Submitted(outcome) => Some(outcome),
            SubmissionState::InProgress => None,
        }
    }

    /// Send the submission. A second call after success returns the first outcome.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the backend does not acknowledge.
    #[instrument(skip(self), fields(user_id = %self.user_id, test_id = %self.test_id))]
    pub async fn submit(
        &mut self,
        now: DateTime<Utc>,
        forced: bool,
    ) -> Result<SubmitOutcome, SessionError> {
        if let Some(outcome) = self.outcome() {
            return Ok(outcome);
        }
        match self.submissions.submit_test(&self.user_id, &self.test_id).await {
            Ok(()) => {
                let outcome = SubmitOutcome {
                    submitted_at: now,
                    redirect_after: self.redirect_delay,
                    forced,
                };
                self.state = SubmissionState::Submitted(outcome);
                info!("test submitted");
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "submission failed");
                Err(SessionError::Submission(err))
            }
        }
    }
}
