#![forbid(unsafe_code)]

pub mod catalog;
pub mod clock_source;
pub mod config;
pub mod error;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use catalog::{CatalogEntry, TestCatalog};
pub use clock_source::ClockSource;
pub use config::EngineConfig;
pub use error::{ConfigError, NavigationError, SessionError};

pub use sessions::{
    DriverExit, ExamProgress, ExamService, ExamSession, Notice, Position, QuestionView,
    SessionCommand, SessionDriver, SessionSnapshot, Severity, SubmitOutcome, TickOutcome,
};
