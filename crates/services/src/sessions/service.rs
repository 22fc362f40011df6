use chrono::{DateTime, Utc};
use exam_core::model::{
    Answer, AttemptContext, CommitAction, MarkedAs, QuestionId, QuestionKind, QuestionState,
    SyncStatus, TestMeta, UserId,
};
use exam_core::time::non_negative_millis;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::expiry::{Countdown, ExpiryGuard};
use super::loader::LoadedSession;
use super::navigation::{Position, SubjectLayout};
use super::notice::Notice;
use super::progress::ExamProgress;
use super::store::AnswerStore;
use super::submission::{SubmissionController, SubmitOutcome};
use super::sync::{CommitStamp, SyncEngine, SyncOutcome};
use crate::clock_source::ClockSource;
use crate::error::SessionError;

/// Read-only projection of one question for display. Never carries the answer key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub subject: String,
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<String>,
    pub unavailable_reason: Option<String>,
    pub answer: Answer,
    pub marked_as: MarkedAs,
    pub sync_status: SyncStatus,
    pub time_spent_ms: u64,
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining_secs: u64 },
    /// Time ran out and the forced submission went through.
    Submitted(SubmitOutcome),
    /// Time ran out but the forced submission failed; only `submit` is accepted.
    Locked,
    /// The session was already submitted.
    Finished(SubmitOutcome),
}

pub(crate) struct SessionParts {
    pub user_id: UserId,
    pub loaded: LoadedSession,
    pub clock: ClockSource,
    pub sync: SyncEngine,
    pub outcomes: mpsc::UnboundedReceiver<SyncOutcome>,
    pub submission: SubmissionController,
    pub notices: Vec<Notice>,
}

/// One candidate's live attempt at one test.
///
/// Owns the answer store, navigation position and timers. All mutation goes
/// through `&mut self`; remote writes run in the background and report back
/// through [`ExamSession::next_sync_outcome`].
pub struct ExamSession {
    user_id: UserId,
    test: TestMeta,
    attempt: AttemptContext,
    clock: ClockSource,
    layout: SubjectLayout,
    store: AnswerStore,
    position: Position,
    active_since: DateTime<Utc>,
    countdown: Countdown,
    expiry: ExpiryGuard,
    sync: SyncEngine,
    outcomes: mpsc::UnboundedReceiver<SyncOutcome>,
    submission: SubmissionController,
    locked: bool,
    notices: Vec<Notice>,
}

impl ExamSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        let SessionParts {
            user_id,
            loaded,
            clock,
            sync,
            outcomes,
            submission,
            notices,
        } = parts;
        let now = clock.now();
        let expiry = ExpiryGuard::new(loaded.attempt.effective_attempt(), loaded.test.duration());
        let total_secs = non_negative_millis(loaded.test.duration()) / 1_000;
        let remaining = (non_negative_millis(expiry.deadline() - now) / 1_000).min(total_secs);
        Self {
            user_id,
            test: loaded.test,
            attempt: loaded.attempt,
            clock,
            layout: loaded.layout,
            store: loaded.store,
            position: Position::default(),
            active_since: now,
            countdown: Countdown::new(remaining),
            expiry,
            sync,
            outcomes,
            submission,
            locked: false,
            notices,
        }
    }

    //
    // ─── QUERIES ──────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn test(&self) -> &TestMeta {
        &self.test
    }

    #[must_use]
    pub fn attempt(&self) -> AttemptContext {
        self.attempt
    }

    #[must_use]
    pub fn clock(&self) -> &ClockSource {
        &self.clock
    }

    #[must_use]
    pub fn layout(&self) -> &SubjectLayout {
        &self.layout
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    #[must_use]
    pub fn current_subject(&self) -> &str {
        self.layout
            .subject_name(self.position.subject)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn current_question_id(&self) -> Option<&QuestionId> {
        self.layout.question_at(self.position)
    }

    #[must_use]
    pub fn state(&self, id: &QuestionId) -> Option<&QuestionState> {
        self.store.state(id)
    }

    #[must_use]
    pub fn current_state(&self) -> Option<&QuestionState> {
        self.current_question_id().and_then(|id| self.store.state(id))
    }

    #[must_use]
    pub fn question_view(&self, id: &QuestionId) -> Option<QuestionView> {
        let question = self.store.question(id)?;
        let state = self.store.state(id)?;
        Some(QuestionView {
            id: id.clone(),
            subject: question.subject().to_string(),
            kind: question.kind(),
            text: question.text().to_string(),
            options: question.options().to_vec(),
            unavailable_reason: question.unavailable_reason().map(str::to_string),
            answer: state.answer().clone(),
            marked_as: state.marked_as(),
            sync_status: state.sync_status(),
            time_spent_ms: state.time_spent_ms(),
        })
    }

    #[must_use]
    pub fn current_view(&self) -> Option<QuestionView> {
        self.current_question_id()
            .and_then(|id| self.question_view(id))
    }

    #[must_use]
    pub fn progress(&self) -> ExamProgress {
        ExamProgress::tally(self.store.states().map(|(_, state)| state))
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        self.countdown.remaining_secs()
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.expiry.deadline()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submission.outcome().is_some()
    }

    #[must_use]
    pub fn submission_outcome(&self) -> Option<SubmitOutcome> {
        self.submission.outcome()
    }

    /// Time ran out and the forced submission failed.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn in_flight_syncs(&self) -> usize {
        self.sync.in_flight()
    }

    #[must_use]
    pub fn failed_syncs(&self) -> usize {
        self.sync.failed_count()
    }

    #[must_use]
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    //
    // ─── ANSWERS ──────────────────────────────────────────────────────────────
    //

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_submitted() {
            return Err(SessionError::Submitted);
        }
        if self.locked {
            return Err(SessionError::Expired {
                ended_at: self.expiry.deadline(),
            });
        }
        Ok(())
    }

    fn current_id(&self) -> Result<QuestionId, SessionError> {
        self.current_question_id()
            .cloned()
            .ok_or(SessionError::Empty)
    }

    /// # Errors
    ///
    /// Returns `SessionError` when the session is closed or the answer does not
    /// fit the question.
    pub fn set_answer(&mut self, id: &QuestionId, answer: Answer) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.store.set_answer(id, answer)?;
        Ok(())
    }

    /// Single choice on the current question; selecting again clears it.
    ///
    /// # Errors
    ///
    /// See [`ExamSession::set_answer`].
    pub fn select_option(&mut self, option: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        let id = self.current_id()?;
        self.store.select_option(&id, option)?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`ExamSession::set_answer`].
    pub fn toggle_option(&mut self, option: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        let id = self.current_id()?;
        self.store.toggle_option(&id, option)?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`ExamSession::set_answer`].
    pub fn set_input_text(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let id = self.current_id()?;
        self.store.set_input_text(&id, text)?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`ExamSession::set_answer`].
    pub fn clear_answer(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let id = self.current_id()?;
        self.store.clear(&id)?;
        Ok(())
    }

    //
    // ─── NAVIGATION ───────────────────────────────────────────────────────────
    //

    fn commit_current(&mut self, action: CommitAction) {
        let now = self.clock.now();
        if let Some(id) = self.layout.question_at(self.position).cloned() {
            let stamp = CommitStamp {
                elapsed_ms: non_negative_millis(now - self.active_since),
                elapsed_test_secs: self.elapsed_test_secs(now),
                now,
            };
            if let Some(plan) = self.sync.commit(&mut self.store, &id, action, stamp) {
                debug!(question_id = %id, ?action, marked_as = ?plan.target, synced = plan.should_sync, "question committed");
            }
        }
        self.active_since = now;
    }

    fn elapsed_test_secs(&self, now: DateTime<Utc>) -> u64 {
        let start = self.attempt.effective_attempt();
        let total = non_negative_millis(self.test.duration()) / 1_000;
        (non_negative_millis(now - start) / 1_000).min(total)
    }

    fn move_to(&mut self, action: CommitAction, target: Position) -> Position {
        self.commit_current(action);
        self.position = target;
        self.position
    }

    /// # Errors
    ///
    /// Returns `SessionError::Submitted` or `SessionError::Expired` once the
    /// session no longer accepts changes.
    pub fn next(&mut self) -> Result<Position, SessionError> {
        self.ensure_open()?;
        let target = self.layout.next(self.position);
        Ok(self.move_to(CommitAction::Next, target))
    }

    /// No-op on the very first question.
    ///
    /// # Errors
    ///
    /// See [`ExamSession::next`].
    pub fn prev(&mut self) -> Result<Position, SessionError> {
        self.ensure_open()?;
        match self.layout.prev(self.position) {
            Some(target) => Ok(self.move_to(CommitAction::Prev, target)),
            None => Ok(self.position),
        }
    }

    /// Jump within the current subject.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Navigation` for an out-of-range index, before
    /// anything is committed.
    pub fn jump(&mut self, index: usize) -> Result<Position, SessionError> {
        self.ensure_open()?;
        let target = self.layout.jump(self.position, index)?;
        Ok(self.move_to(CommitAction::Jump, target))
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` for an unknown subject.
    pub fn change_subject(&mut self, subject: &str) -> Result<Position, SessionError> {
        self.ensure_open()?;
        let target = self.layout.change_subject(subject)?;
        Ok(self.move_to(CommitAction::Jump, target))
    }

    /// Mark the current question for review and move on.
    ///
    /// # Errors
    ///
    /// See [`ExamSession::next`].
    pub fn mark_for_review(&mut self) -> Result<Position, SessionError> {
        self.ensure_open()?;
        let target = self.layout.next(self.position);
        Ok(self.move_to(CommitAction::Review, target))
    }

    //
    // ─── TIMERS AND SYNC ──────────────────────────────────────────────────────
    //

    /// Periodic save of the active question without moving. Also resends
    /// records whose earlier write failed. Returns whether a commit ran.
    pub fn autosave(&mut self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        let needs_commit = self
            .current_state()
            .is_some_and(|s| s.is_dirty() || s.marked_as() != MarkedAs::None);
        if needs_commit {
            self.commit_current(CommitAction::Autosave);
        }
        self.sync.retry_failed(&mut self.store);
        needs_commit
    }

    /// Next background write result. Pending forever while nothing is in flight.
    pub async fn next_sync_outcome(&mut self) -> Option<SyncOutcome> {
        self.outcomes.recv().await
    }

    pub async fn apply_sync_outcome(&mut self, outcome: SyncOutcome) {
        if let Some(notice) = self.sync.apply_outcome(&mut self.store, outcome).await {
            self.notices.push(notice);
        }
    }

    /// Wait for every in-flight write and apply its outcome.
    pub async fn settle(&mut self) {
        while self.sync.in_flight() > 0 {
            match self.outcomes.recv().await {
                Some(outcome) => self.apply_sync_outcome(outcome).await,
                None => break,
            }
        }
    }

    /// One-second tick: wall-clock expiry check first, then the countdown.
    pub async fn tick(&mut self) -> TickOutcome {
        if let Some(outcome) = self.submission.outcome() {
            return TickOutcome::Finished(outcome);
        }
        let now = self.clock.now();
        if self.expiry.check(now) {
            let ended_at = self.expiry.deadline();
            info!(%ended_at, "test window closed, submitting");
            self.notices.push(Notice::Expired { ended_at });
            return self.force_submit().await;
        }
        if self.locked {
            return TickOutcome::Locked;
        }
        if self.countdown.tick() {
            info!("countdown reached zero, submitting");
            return self.force_submit().await;
        }
        TickOutcome::Running {
            remaining_secs: self.countdown.remaining_secs(),
        }
    }

    async fn force_submit(&mut self) -> TickOutcome {
        match self.finish(true).await {
            Ok(outcome) => TickOutcome::Submitted(outcome),
            Err(_) => {
                self.locked = true;
                TickOutcome::Locked
            }
        }
    }

    //
    // ─── SUBMISSION ───────────────────────────────────────────────────────────
    //

    /// Commit the current question, flush pending writes and finalize the
    /// attempt. Calling again after success returns the first outcome.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the backend rejects the
    /// submission; the attempt stays open for another try.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        if let Some(outcome) = self.submission.outcome() {
            return Ok(outcome);
        }
        self.finish(false).await
    }

    async fn finish(&mut self, forced: bool) -> Result<SubmitOutcome, SessionError> {
        if !self.locked {
            self.commit_current(CommitAction::Autosave);
        }
        self.settle().await;
        let now = self.clock.now();
        match self.submission.submit(now, forced).await {
            Ok(outcome) => {
                self.notices.push(Notice::Submitted {
                    redirect_after: outcome.redirect_after,
                });
                Ok(outcome)
            }
            Err(err) => {
                let reason = match &err {
                    SessionError::Submission(source) => source.to_string(),
                    other => other.to_string(),
                };
                self.notices.push(Notice::SubmissionFailed { reason });
                Err(err)
            }
        }
    }
}
