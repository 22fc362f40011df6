mod answer;
mod attempt;
mod ids;
mod marking;
mod question;
mod record;
mod state;
mod test_meta;

pub use ids::{QuestionId, RecordId, TestId, UserId};

pub use answer::{Answer, AnswerError, AnswerPayload};
pub use attempt::AttemptContext;
pub use marking::{CommitAction, MarkedAs, SyncStatus};
pub use question::{DEFAULT_SUBJECT, Question, QuestionError, QuestionKind};
pub use record::{AnswerRecord, SolvedDuringTest, Verdict};
pub use state::QuestionState;
pub use test_meta::{MarkingScheme, TestMeta};
