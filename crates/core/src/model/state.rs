use crate::model::answer::Answer;
use crate::model::marking::{MarkedAs, SyncStatus};

/// Mutable per-question state held for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuestionState {
    answer: Answer,
    marked_as: MarkedAs,
    time_spent_ms: u64,
    dirty: bool,
    visited: bool,
    sync_status: SyncStatus,
}

impl QuestionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State recovered from a persisted record.
    #[must_use]
    pub fn restored(answer: Answer, marked_as: MarkedAs, time_spent_ms: u64) -> Self {
        Self {
            answer: answer.normalized(),
            marked_as,
            time_spent_ms,
            dirty: false,
            visited: true,
            sync_status: SyncStatus::Synced,
        }
    }

    #[must_use]
    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    #[must_use]
    pub fn has_answer(&self) -> bool {
        !self.answer.is_empty()
    }

    #[must_use]
    pub fn marked_as(&self) -> MarkedAs {
        self.marked_as
    }

    #[must_use]
    pub fn time_spent_ms(&self) -> u64 {
        self.time_spent_ms
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_visited(&self) -> bool {
        self.visited
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Replaces the answer and flags it for the next sync. Marking, time and
    /// sync status are left alone.
    pub fn set_answer(&mut self, answer: Answer) {
        self.answer = answer.normalized();
        self.dirty = true;
    }

    /// Optimistic update applied when the question is committed.
    pub fn apply_commit(&mut self, marked_as: MarkedAs, time_spent_ms: u64, will_sync: bool) {
        self.marked_as = marked_as;
        self.time_spent_ms = self.time_spent_ms.max(time_spent_ms);
        self.dirty = false;
        self.visited = true;
        if will_sync {
            self.sync_status = SyncStatus::Pending;
        }
    }

    pub fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}
