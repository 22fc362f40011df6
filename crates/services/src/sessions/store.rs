use std::collections::HashMap;

use exam_core::model::{
    Answer, AnswerError, AnswerRecord, Question, QuestionId, QuestionState, SyncStatus,
};
use tracing::warn;

/// Per-question answer state, keyed by question id.
///
/// Every question of the test has exactly one entry from construction on.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    questions: HashMap<QuestionId, Question>,
    states: HashMap<QuestionId, QuestionState>,
}

impl AnswerStore {
    #[must_use]
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        let questions: HashMap<_, _> = questions
            .into_iter()
            .map(|q| (q.id().clone(), q))
            .collect();
        let states = questions
            .keys()
            .map(|id| (id.clone(), QuestionState::new()))
            .collect();
        Self { questions, states }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.get(id)
    }

    #[must_use]
    pub fn state(&self, id: &QuestionId) -> Option<&QuestionState> {
        self.states.get(id)
    }

    pub(crate) fn state_mut(&mut self, id: &QuestionId) -> Option<&mut QuestionState> {
        self.states.get_mut(id)
    }

    pub fn states(&self) -> impl Iterator<Item = (&QuestionId, &QuestionState)> {
        self.states.iter()
    }

    /// Replace the answer after checking it fits the question.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` for unknown or unavailable questions and for
    /// answers of the wrong shape.
    pub fn set_answer(&mut self, id: &QuestionId, answer: Answer) -> Result<(), AnswerError> {
        let question = self
            .questions
            .get(id)
            .ok_or_else(|| AnswerError::UnknownQuestion(id.clone()))?;
        let answer = answer.normalized();
        answer.validate_for(question)?;
        if let Some(state) = self.states.get_mut(id) {
            state.set_answer(answer);
        }
        Ok(())
    }

    fn current(&self, id: &QuestionId) -> Result<&Answer, AnswerError> {
        self.states
            .get(id)
            .map(QuestionState::answer)
            .ok_or_else(|| AnswerError::UnknownQuestion(id.clone()))
    }

    /// Single choice: select `option`, or clear it when already selected.
    ///
    /// # Errors
    ///
    /// See [`AnswerStore::set_answer`].
    pub fn select_option(&mut self, id: &QuestionId, option: usize) -> Result<(), AnswerError> {
        let next = self.current(id)?.toggled_single(option);
        self.set_answer(id, next)
    }

    /// Multiple choice: flip membership of `option`.
    ///
    /// # Errors
    ///
    /// See [`AnswerStore::set_answer`].
    pub fn toggle_option(&mut self, id: &QuestionId, option: usize) -> Result<(), AnswerError> {
        let next = self.current(id)?.toggled_multi(option);
        self.set_answer(id, next)
    }

    /// # Errors
    ///
    /// See [`AnswerStore::set_answer`].
    pub fn set_input_text(
        &mut self,
        id: &QuestionId,
        text: impl Into<String>,
    ) -> Result<(), AnswerError> {
        self.set_answer(id, Answer::Input(text.into()))
    }

    /// # Errors
    ///
    /// Returns `AnswerError::UnknownQuestion` for ids outside the test.
    pub fn clear(&mut self, id: &QuestionId) -> Result<(), AnswerError> {
        self.current(id)?;
        if let Some(state) = self.states.get_mut(id) {
            state.set_answer(Answer::None);
        }
        Ok(())
    }

    /// Overlay a persisted record. Records for unknown questions, or whose
    /// answer no longer fits the question, are skipped.
    pub(crate) fn restore(&mut self, record: &AnswerRecord, status: SyncStatus) -> bool {
        let Some(question) = self.questions.get(&record.question_id) else {
            return false;
        };
        let answer = record.answer().normalized();
        if let Err(err) = answer.validate_for(question) {
            warn!(question_id = %record.question_id, error = %err, "ignoring persisted answer");
            return false;
        }
        let mut state =
            QuestionState::restored(answer, record.restored_marking(), record.time_taken_ms());
        state.set_sync_status(status);
        self.states.insert(record.question_id.clone(), state);
        true
    }
}
