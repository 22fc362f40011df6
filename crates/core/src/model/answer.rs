use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::{Question, QuestionKind};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("question {0} is unavailable")]
    Unavailable(QuestionId),

    #[error("answer shape does not fit a {kind} question")]
    ShapeMismatch { kind: &'static str },

    #[error("option {option} out of range ({len} options)")]
    OptionOutOfRange { option: usize, len: usize },
}

//
// ─── ANSWER ───────────────────────────────────────────────────────────────────
//

/// The user's current answer to one question.
///
/// Emptiness is type specific: an empty selection set or blank text counts as
/// no answer, and `normalized` collapses both into `Answer::None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Answer {
    #[default]
    None,
    Single(usize),
    Multi(BTreeSet<usize>),
    Input(String),
}

impl Answer {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Answer::None => true,
            Answer::Single(_) => false,
            Answer::Multi(set) => set.is_empty(),
            Answer::Input(text) => text.trim().is_empty(),
        }
    }

    #[must_use]
    pub fn normalized(self) -> Self {
        if self.is_empty() { Answer::None } else { self }
    }

    /// Selecting the already-selected option clears the answer; any other option replaces it.
    #[must_use]
    pub fn toggled_single(&self, option: usize) -> Self {
        match self {
            Answer::Single(current) if *current == option => Answer::None,
            _ => Answer::Single(option),
        }
    }

    /// Flips membership of `option` in the selection set.
    #[must_use]
    pub fn toggled_multi(&self, option: usize) -> Self {
        let mut set = match self {
            Answer::Multi(set) => set.clone(),
            _ => BTreeSet::new(),
        };
        if !set.remove(&option) {
            set.insert(option);
        }
        Answer::Multi(set).normalized()
    }

    /// Checks that this answer can be stored against `question`.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the question is unavailable, the shape does not
    /// match the question type, or an option index is out of range.
    pub fn validate_for(&self, question: &Question) -> Result<(), AnswerError> {
        if !question.is_available() {
            return Err(AnswerError::Unavailable(question.id().clone()));
        }
        let kind = question.kind();
        let len = question.options().len();
        let check = |option: usize| {
            if option < len {
                Ok(())
            } else {
                Err(AnswerError::OptionOutOfRange { option, len })
            }
        };
        match (self, kind) {
            (Answer::None, _) => Ok(()),
            (Answer::Single(option), QuestionKind::SingleChoice) => check(*option),
            (Answer::Multi(set), QuestionKind::MultiChoice) => {
                set.iter().try_for_each(|option| check(*option))
            }
            (Answer::Input(_), QuestionKind::Input) => Ok(()),
            _ => Err(AnswerError::ShapeMismatch {
                kind: kind.as_str(),
            }),
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> AnswerPayload {
        match self.clone().normalized() {
            Answer::None => AnswerPayload::default(),
            Answer::Single(option) => AnswerPayload {
                selected_option: Some(option),
                ..AnswerPayload::default()
            },
            Answer::Multi(set) => AnswerPayload {
                selected_options: Some(set.into_iter().collect()),
                ..AnswerPayload::default()
            },
            Answer::Input(text) => AnswerPayload {
                input_text: Some(text),
                ..AnswerPayload::default()
            },
        }
    }

    /// Reads a persisted payload back. The first populated field wins.
    #[must_use]
    pub fn from_payload(payload: &AnswerPayload) -> Self {
        if let Some(option) = payload.selected_option {
            return Answer::Single(option);
        }
        if let Some(options) = &payload.selected_options {
            return Answer::Multi(options.iter().copied().collect()).normalized();
        }
        if let Some(text) = &payload.input_text {
            return Answer::Input(text.clone()).normalized();
        }
        Answer::None
    }
}

/// Wire shape of an answer: `{}` when there is none.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
}
