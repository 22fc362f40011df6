mod driver;
mod expiry;
mod loader;
mod navigation;
mod notice;
mod progress;
mod service;
mod store;
mod submission;
mod sync;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{NavigationError, SessionError};
pub use driver::{DriverExit, SessionCommand, SessionDriver, SessionSnapshot, UpdateCause};
pub use expiry::{Countdown, ExpiryGuard};
pub use navigation::{Position, SubjectLayout};
pub use notice::{Notice, Severity};
pub use progress::ExamProgress;
pub use service::{ExamSession, QuestionView, TickOutcome};
pub use store::AnswerStore;
pub use submission::{SubmissionController, SubmissionState, SubmitOutcome};
pub use sync::{CommitPlan, SyncEngine, SyncOutcome, plan_commit};
pub use workflow::ExamService;
