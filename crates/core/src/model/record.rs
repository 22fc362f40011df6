use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::answer::{Answer, AnswerPayload};
use crate::model::ids::{QuestionId, RecordId, TestId, UserId};
use crate::model::marking::MarkedAs;
use crate::model::question::QuestionKind;

/// Grading outcome. Filled in by the backend; the client always sends `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Pending,
    Correct,
    Incorrect,
}

/// Context of the test a record was produced in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedDuringTest {
    pub test_type: String,
    pub test_id: TestId,
    /// Seconds of test time elapsed when the record was written.
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub marked_as: MarkedAs,
}

/// Durable representation of one question's state, upserted by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(alias = "$id")]
    pub id: RecordId,
    pub question_id: QuestionId,
    pub user_id: UserId,
    pub solved_during_test: SolvedDuringTest,
    /// Cumulative time on the question in whole seconds.
    pub time_taken: u64,
    #[serde(default)]
    pub answer: AnswerPayload,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub submitted_at: DateTime<Utc>,
    pub question_type: QuestionKind,
    #[serde(default)]
    pub verdict: Verdict,
}

impl AnswerRecord {
    #[must_use]
    pub fn answer(&self) -> Answer {
        Answer::from_payload(&self.answer)
    }

    /// Marking to restore on resume; derived from the answer when none was stored.
    #[must_use]
    pub fn restored_marking(&self) -> MarkedAs {
        match self.solved_during_test.marked_as {
            MarkedAs::None => MarkedAs::from_answer(!self.answer().is_empty()),
            marked => marked,
        }
    }

    #[must_use]
    pub fn time_taken_ms(&self) -> u64 {
        self.time_taken.saturating_mul(1_000)
    }
}
