use std::collections::HashMap;

use exam_core::model::{Question, QuestionId};

use crate::error::NavigationError;

/// Subject index plus question index within that subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub subject: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubjectBucket {
    name: String,
    questions: Vec<QuestionId>,
}

/// Questions grouped by primary subject, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectLayout {
    subjects: Vec<SubjectBucket>,
}

impl SubjectLayout {
    #[must_use]
    pub fn partition<'a>(questions: impl IntoIterator<Item = &'a Question>) -> Self {
        let mut subjects: Vec<SubjectBucket> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for question in questions {
            let name = question.subject();
            let slot = *index.entry(name.to_string()).or_insert_with(|| {
                subjects.push(SubjectBucket {
                    name: name.to_string(),
                    questions: Vec::new(),
                });
                subjects.len() - 1
            });
            subjects[slot].questions.push(question.id().clone());
        }
        Self { subjects }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.subjects.iter().map(|s| s.questions.len()).sum()
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn subject_name(&self, subject: usize) -> Option<&str> {
        self.subjects.get(subject).map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn questions_in(&self, subject: usize) -> &[QuestionId] {
        self.subjects
            .get(subject)
            .map_or(&[], |s| s.questions.as_slice())
    }

    #[must_use]
    pub fn question_at(&self, position: Position) -> Option<&QuestionId> {
        self.questions_in(position.subject).get(position.index)
    }

    /// Next question, rolling into the next subject. The sequence is cyclic:
    /// the last question of the last subject leads back to the very first one.
    #[must_use]
    pub fn next(&self, position: Position) -> Position {
        let len = self.questions_in(position.subject).len();
        if position.index + 1 < len {
            return Position {
                index: position.index + 1,
                ..position
            };
        }
        let count = self.subjects.len();
        (1..=count)
            .map(|step| (position.subject + step) % count)
            .find(|&s| !self.subjects[s].questions.is_empty())
            .map_or(position, |subject| Position { subject, index: 0 })
    }

    /// Previous question, rolling back into the last question of the previous
    /// subject; `None` on the very first question.
    #[must_use]
    pub fn prev(&self, position: Position) -> Option<Position> {
        if let Some(index) = position.index.checked_sub(1) {
            return Some(Position { index, ..position });
        }
        (0..position.subject)
            .rev()
            .find(|&s| !self.subjects[s].questions.is_empty())
            .map(|subject| Position {
                subject,
                index: self.subjects[subject].questions.len() - 1,
            })
    }

    /// # Errors
    ///
    /// Returns `NavigationError::OutOfRange` if `index` is outside the current subject.
    pub fn jump(&self, position: Position, index: usize) -> Result<Position, NavigationError> {
        let len = self.questions_in(position.subject).len();
        if index >= len {
            return Err(NavigationError::OutOfRange {
                subject: self
                    .subject_name(position.subject)
                    .unwrap_or_default()
                    .to_string(),
                index,
                len,
            });
        }
        Ok(Position { index, ..position })
    }

    /// First question of the named subject.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::UnknownSubject` if no question carries that subject.
    pub fn change_subject(&self, name: &str) -> Result<Position, NavigationError> {
        self.subjects
            .iter()
            .position(|s| s.name == name)
            .map(|subject| Position { subject, index: 0 })
            .ok_or_else(|| NavigationError::UnknownSubject(name.to_string()))
    }
}
