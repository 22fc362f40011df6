use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::Answer;
use crate::model::ids::QuestionId;

/// Bucket for questions that carry no subject tag.
pub const DEFAULT_SUBJECT: &str = "General";

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("unknown question type: {0}")]
    UnknownKind(String),

    #[error("choice question has no options")]
    MissingOptions,
}

//
// ─── QUESTION KIND ────────────────────────────────────────────────────────────
//

/// How a question is answered. Serializes to the normalized name and accepts
/// every alias understood by [`QuestionKind::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum QuestionKind {
    /// Exactly one option may be selected.
    SingleChoice,
    /// Any subset of the options may be selected.
    MultiChoice,
    /// Free-text (numerical) answer.
    Input,
}

impl TryFrom<String> for QuestionKind {
    type Error = QuestionError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<QuestionKind> for &'static str {
    fn from(kind: QuestionKind) -> Self {
        kind.as_str()
    }
}

impl QuestionKind {
    /// Parses the type strings used by the question bank, including legacy aliases.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::UnknownKind` for anything unrecognised.
    pub fn parse(raw: &str) -> Result<Self, QuestionError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" | "mcq" | "single-choice" | "singlecorrect" => Ok(Self::SingleChoice),
            "multiple" | "multi" | "msq" | "multi-choice" | "multiplecorrect" => {
                Ok(Self::MultiChoice)
            }
            "input" | "integer" | "numerical" | "text" => Ok(Self::Input),
            _ => Err(QuestionError::UnknownKind(raw.to_string())),
        }
    }

    /// Normalized wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single",
            Self::MultiChoice => "multiple",
            Self::Input => "input",
        }
    }

    #[must_use]
    pub fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultiChoice)
    }
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A question as loaded for a session. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    subjects: Vec<String>,
    kind: QuestionKind,
    text: String,
    options: Vec<String>,
    answer_key: Option<Answer>,
    unavailable: Option<String>,
}

impl Question {
    /// Builds a question. A choice question without options is kept but marked unavailable.
    #[must_use]
    pub fn new(
        id: QuestionId,
        subjects: Vec<String>,
        kind: QuestionKind,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        let unavailable = (kind.is_choice() && options.is_empty())
            .then(|| QuestionError::MissingOptions.to_string());
        Self {
            id,
            subjects,
            kind,
            text: text.into(),
            options,
            answer_key: None,
            unavailable,
        }
    }

    /// Placeholder for a question whose data could not be understood.
    #[must_use]
    pub fn unavailable(id: QuestionId, subjects: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            subjects,
            kind: QuestionKind::Input,
            text: String::new(),
            options: Vec::new(),
            answer_key: None,
            unavailable: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn with_answer_key(mut self, key: Answer) -> Self {
        self.answer_key = Some(key);
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// The subject this question is filed under: its first tag, or the default bucket.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subjects
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUBJECT)
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Correct answer, when the backend exposed one. Never shown during a live attempt.
    #[must_use]
    pub fn answer_key(&self) -> Option<&Answer> {
        self.answer_key.as_ref()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    #[must_use]
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }
}
