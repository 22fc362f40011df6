//! Commit planning and background delivery of answer records.
//!
//! Each commit that needs a write is sent as its own task; results come back
//! over a channel and are applied by the session. Writes are tagged with a
//! per-question sequence number and only the latest write of a question may
//! touch its status or its outbox entry. Failed records are staged in the
//! outbox and kept for retry on the next autosave, unless a newer record for
//! the same question is sent first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerRecord, AttemptContext, CommitAction, MarkedAs, QuestionId, QuestionKind,
    QuestionState, RecordId, SolvedDuringTest, SyncStatus, TestId, UserId, Verdict,
};
use storage::repository::{AnswerOutbox, AnswerRepository, StorageError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::notice::Notice;
use super::store::AnswerStore;

/// What a commit will do to one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPlan {
    pub target: MarkedAs,
    pub should_sync: bool,
    pub time_spent_ms: u64,
}

/// Decide the marking and whether a remote write is needed.
///
/// A write happens for review marks, for changed answers, for changed-to-empty
/// answers and for the first visit of an unanswered question.
#[must_use]
pub fn plan_commit(state: &QuestionState, action: CommitAction, elapsed_ms: u64) -> CommitPlan {
    let has_answer = state.has_answer();
    let should_sync = action == CommitAction::Review
        || state.is_dirty()
        || (!has_answer && !state.is_visited());
    CommitPlan {
        target: MarkedAs::for_commit(has_answer, action),
        should_sync,
        time_spent_ms: state.time_spent_ms().saturating_add(elapsed_ms),
    }
}

/// Timing facts captured when the commit happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommitStamp {
    /// Time spent on the question since it became active.
    pub elapsed_ms: u64,
    /// Test time elapsed so far.
    pub elapsed_test_secs: u64,
    pub now: DateTime<Utc>,
}

/// Result of one background write.
#[derive(Debug)]
pub struct SyncOutcome {
    question_id: QuestionId,
    seq: u64,
    record: AnswerRecord,
    result: Result<(), StorageError>,
}

impl SyncOutcome {
    #[must_use]
    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct SyncEngine {
    user_id: UserId,
    test_id: TestId,
    test_type: String,
    attempt: AttemptContext,
    answers: Arc<dyn AnswerRepository>,
    outbox: Arc<dyn AnswerOutbox>,
    outcomes: mpsc::UnboundedSender<SyncOutcome>,
    latest: HashMap<QuestionId, u64>,
    next_seq: u64,
    in_flight: usize,
    failed: HashMap<QuestionId, AnswerRecord>,
    degraded: HashSet<QuestionId>,
}

impl SyncEngine {
    pub(crate) fn new(
        user_id: UserId,
        test_id: TestId,
        test_type: String,
        attempt: AttemptContext,
        answers: Arc<dyn AnswerRepository>,
        outbox: Arc<dyn AnswerOutbox>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            user_id,
            test_id,
            test_type,
            attempt,
            answers,
            outbox,
            outcomes: tx,
            latest: HashMap::new(),
            next_seq: 0,
            in_flight: 0,
            failed: HashMap::new(),
            degraded: HashSet::new(),
        };
        (engine, rx)
    }

    #[must_use]
    pub fn attempt(&self) -> AttemptContext {
        self.attempt
    }

    #[must_use]
    pub fn record_id(&self, question_id: &QuestionId) -> RecordId {
        self.attempt.record_id(&self.user_id, question_id)
    }

    /// Writes sent whose outcome has not been applied yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Questions whose latest record is waiting for a retry.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Records recovered from the outbox at load time.
    pub(crate) fn seed_failed(&mut self, records: impl IntoIterator<Item = AnswerRecord>) {
        for record in records {
            self.degraded.insert(record.question_id.clone());
            self.failed.insert(record.question_id.clone(), record);
        }
    }

    /// Commit the state of one question and send a write when the plan asks
    /// for one. Returns `None` for questions outside the store.
    pub(crate) fn commit(
        &mut self,
        store: &mut AnswerStore,
        question_id: &QuestionId,
        action: CommitAction,
        stamp: CommitStamp,
    ) -> Option<CommitPlan> {
        let kind = store.question(question_id)?.kind();
        let state = store.state_mut(question_id)?;
        let plan = plan_commit(state, action, stamp.elapsed_ms);
        state.apply_commit(plan.target, plan.time_spent_ms, plan.should_sync);
        if plan.should_sync {
            let record = self.record(question_id, kind, state, stamp);
            self.dispatch(record);
        }
        Some(plan)
    }

    fn record(
        &self,
        question_id: &QuestionId,
        kind: QuestionKind,
        state: &QuestionState,
        stamp: CommitStamp,
    ) -> AnswerRecord {
        AnswerRecord {
            id: self.record_id(question_id),
            question_id: question_id.clone(),
            user_id: self.user_id.clone(),
            solved_during_test: SolvedDuringTest {
                test_type: self.test_type.clone(),
                test_id: self.test_id.clone(),
                elapsed_seconds: stamp.elapsed_test_secs,
                marked_as: state.marked_as(),
            },
            time_taken: state.time_spent_ms() / 1_000,
            answer: state.answer().to_payload(),
            submitted_at: stamp.now,
            question_type: kind,
            verdict: Verdict::Pending,
        }
    }

    fn dispatch(&mut self, record: AnswerRecord) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let question_id = record.question_id.clone();
        self.latest.insert(question_id.clone(), seq);
        // The record being sent replaces whatever was waiting for a retry.
        self.failed.remove(&question_id);
        self.in_flight += 1;
        debug!(question_id = %question_id, seq, "sending answer record");

        let answers = Arc::clone(&self.answers);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = answers.upsert_answer(&record).await;
            let outcome = SyncOutcome {
                question_id,
                seq,
                record,
                result,
            };
            if outcomes.send(outcome).is_err() {
                debug!("session closed before sync outcome arrived");
            }
        });
    }

    /// Apply a write result and mirror it into the outbox. Outcomes of
    /// superseded writes only release their in-flight slot.
    pub(crate) async fn apply_outcome(
        &mut self,
        store: &mut AnswerStore,
        outcome: SyncOutcome,
    ) -> Option<Notice> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let SyncOutcome {
            question_id,
            seq,
            record,
            result,
        } = outcome;
        if self.latest.get(&question_id) != Some(&seq) {
            debug!(question_id = %question_id, seq, "ignoring stale sync outcome");
            return None;
        }
        match result {
            Ok(()) => {
                if let Err(err) = self.outbox.remove(&record.id).await {
                    warn!(question_id = %question_id, error = %err, "outbox cleanup failed");
                }
                if let Some(state) = store.state_mut(&question_id) {
                    state.set_sync_status(SyncStatus::Synced);
                }
                self.degraded
                    .remove(&question_id)
                    .then_some(Notice::SyncRecovered { question_id })
            }
            Err(err) => {
                warn!(question_id = %question_id, error = %err, "answer sync failed, kept for retry");
                if let Err(err) = self.outbox.stage(&record).await {
                    warn!(question_id = %question_id, error = %err, "outbox staging failed");
                }
                if let Some(state) = store.state_mut(&question_id) {
                    state.set_sync_status(SyncStatus::Error);
                }
                self.degraded.insert(question_id.clone());
                self.failed.insert(question_id.clone(), record);
                Some(Notice::SyncDeferred {
                    question_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Resend failed records for questions with no write in flight.
    pub(crate) fn retry_failed(&mut self, store: &mut AnswerStore) -> usize {
        let ready: Vec<AnswerRecord> = self
            .failed
            .values()
            .filter(|record| {
                store
                    .state(&record.question_id)
                    .is_some_and(|state| state.sync_status() != SyncStatus::Pending)
            })
            .cloned()
            .collect();
        let count = ready.len();
        for record in ready {
            if let Some(state) = store.state_mut(&record.question_id) {
                state.set_sync_status(SyncStatus::Pending);
            }
            self.dispatch(record);
        }
        if count > 0 {
            debug!(count, "retrying failed answer records");
        }
        count
    }
}
