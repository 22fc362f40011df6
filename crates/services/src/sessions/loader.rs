use chrono::{DateTime, Utc};
use exam_core::model::{AnswerRecord, AttemptContext, SyncStatus, TestId, TestMeta, UserId};
use storage::repository::{AnswerOutbox, AnswerRepository};
use tracing::{debug, instrument, warn};

use super::navigation::SubjectLayout;
use super::store::AnswerStore;
use crate::catalog::TestCatalog;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartMode {
    Live,
    Retake,
}

/// Everything a session needs before its timers start.
pub(crate) struct LoadedSession {
    pub test: TestMeta,
    pub attempt: AttemptContext,
    pub layout: SubjectLayout,
    pub store: AnswerStore,
    /// Outbox records overlaid on the store, awaiting redelivery.
    pub recovered: Vec<AnswerRecord>,
}

/// Loads content and prior progress for one (user, test) pair.
pub(crate) struct SessionLoader<'a> {
    pub catalog: &'a TestCatalog,
    pub answers: &'a dyn AnswerRepository,
    pub outbox: &'a dyn AnswerOutbox,
}

impl SessionLoader<'_> {
    #[instrument(skip(self, test_id, user_id), fields(test_id = %test_id, user_id = %user_id))]
    pub async fn load(
        &self,
        test_id: &TestId,
        user_id: &UserId,
        now: DateTime<Utc>,
        mode: StartMode,
    ) -> Result<LoadedSession, SessionError> {
        let entry = self.catalog.get(test_id).await?;
        let test = entry.test;
        if now < test.scheduled_start {
            return Err(SessionError::NotStarted {
                starts_at: test.scheduled_start,
            });
        }
        match (mode, test.has_ended(now)) {
            (StartMode::Live, true) => {
                return Err(SessionError::Expired {
                    ended_at: test.scheduled_end(),
                });
            }
            (StartMode::Retake, false) => {
                return Err(SessionError::StillRunning {
                    ends_at: test.scheduled_end(),
                });
            }
            _ => {}
        }
        if entry.questions.is_empty() {
            return Err(SessionError::Empty);
        }

        let attempt = AttemptContext::resolve(&test, now);
        let layout = SubjectLayout::partition(&entry.questions);
        let mut store = AnswerStore::new(entry.questions);
        if attempt.is_live() {
            self.overlay_remote(&mut store, user_id, test_id).await;
        }
        let recovered = self
            .overlay_outbox(&mut store, attempt, user_id, test_id)
            .await;
        debug!(
            subjects = layout.subjects().count(),
            questions = store.len(),
            recovered = recovered.len(),
            live = attempt.is_live(),
            "session loaded"
        );
        Ok(LoadedSession {
            test,
            attempt,
            layout,
            store,
            recovered,
        })
    }

    async fn overlay_remote(&self, store: &mut AnswerStore, user_id: &UserId, test_id: &TestId) {
        let mut records = match self.answers.previous_answers(user_id, test_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "could not fetch previous answers, starting fresh");
                return;
            }
        };
        // Latest record per question wins.
        records.sort_by_key(|r| r.submitted_at);
        let restored = records
            .iter()
            .filter(|r| store.restore(r, SyncStatus::Synced))
            .count();
        debug!(fetched = records.len(), restored, "previous answers restored");
    }

    async fn overlay_outbox(
        &self,
        store: &mut AnswerStore,
        attempt: AttemptContext,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Vec<AnswerRecord> {
        let staged = match self.outbox.pending(user_id, test_id).await {
            Ok(staged) => staged,
            Err(err) => {
                warn!(error = %err, "could not read local outbox");
                return Vec::new();
            }
        };
        staged
            .into_iter()
            .filter(|r| r.id == attempt.record_id(user_id, &r.question_id))
            .filter(|r| store.restore(r, SyncStatus::Error))
            .collect()
    }
}
