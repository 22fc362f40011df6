use serde::{Deserialize, Serialize};

/// Lifecycle label applied to a question at the moment it is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkedAs {
    #[default]
    None,
    Answered,
    Skipped,
    Review,
    ReviewAnswered,
}

impl MarkedAs {
    /// Marking a commit should leave behind for the given action.
    #[must_use]
    pub fn for_commit(has_answer: bool, action: CommitAction) -> Self {
        match (action, has_answer) {
            (CommitAction::Review, true) => Self::ReviewAnswered,
            (CommitAction::Review, false) => Self::Review,
            (_, true) => Self::Answered,
            (_, false) => Self::Skipped,
        }
    }

    /// Marking implied by a persisted answer when no explicit marking survived.
    #[must_use]
    pub fn from_answer(has_answer: bool) -> Self {
        if has_answer { Self::Answered } else { Self::Skipped }
    }

    #[must_use]
    pub fn is_review(self) -> bool {
        matches!(self, Self::Review | Self::ReviewAnswered)
    }
}

/// Why the current question is being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitAction {
    Next,
    Prev,
    Jump,
    Review,
    Autosave,
}

/// Last known outcome of persisting a question's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Pending,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_table_matches_every_action() {
        let plain = [
            CommitAction::Next,
            CommitAction::Prev,
            CommitAction::Jump,
            CommitAction::Autosave,
        ];
        for action in plain {
            assert_eq!(MarkedAs::for_commit(true, action), MarkedAs::Answered);
            assert_eq!(MarkedAs::for_commit(false, action), MarkedAs::Skipped);
        }
        assert_eq!(
            MarkedAs::for_commit(true, CommitAction::Review),
            MarkedAs::ReviewAnswered
        );
        assert_eq!(
            MarkedAs::for_commit(false, CommitAction::Review),
            MarkedAs::Review
        );
    }

    #[test]
    fn marking_uses_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&MarkedAs::ReviewAnswered).unwrap();
        assert_eq!(json, "\"review-answered\"");
        let back: MarkedAs = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(back, MarkedAs::Skipped);
    }
}
