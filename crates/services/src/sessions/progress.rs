use exam_core::model::{MarkedAs, QuestionState, SyncStatus};

/// Palette counts across the whole test, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExamProgress {
    pub total: usize,
    pub answered: usize,
    pub skipped: usize,
    pub review: usize,
    pub review_answered: usize,
    pub not_visited: usize,
    /// Questions whose latest record is pending or failed.
    pub unsynced: usize,
}

impl ExamProgress {
    pub(crate) fn tally<'a>(states: impl IntoIterator<Item = &'a QuestionState>) -> Self {
        let mut progress = Self::default();
        for state in states {
            progress.total += 1;
            match state.marked_as() {
                MarkedAs::Answered => progress.answered += 1,
                MarkedAs::Skipped => progress.skipped += 1,
                MarkedAs::Review => progress.review += 1,
                MarkedAs::ReviewAnswered => progress.review_answered += 1,
                MarkedAs::None => {}
            }
            if !state.is_visited() {
                progress.not_visited += 1;
            }
            if state.sync_status() != SyncStatus::Synced {
                progress.unsynced += 1;
            }
        }
        progress
    }

    /// Questions that will be graded as attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.answered + self.review_answered
    }
}
