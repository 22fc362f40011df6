#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use exam_core::Clock;
use exam_core::model::{
    MarkingScheme, Question, QuestionId, QuestionKind, TestId, TestMeta, UserId,
};
use exam_core::time::fixed_now;
use services::ExamService;
use storage::repository::{InMemoryOutbox, InMemoryRepository, Storage};

pub const USER: &str = "u1";
pub const TEST: &str = "t1";

pub fn user() -> UserId {
    UserId::new(USER)
}

pub fn test_id() -> TestId {
    TestId::new(TEST)
}

pub fn meta(duration_minutes: u32) -> TestMeta {
    TestMeta {
        id: test_id(),
        title: "JEE Main Mock 3".into(),
        scheduled_start: fixed_now(),
        duration_minutes,
        marking_scheme: MarkingScheme::default(),
        test_type: "mock".into(),
    }
}

pub fn choice(id: &str, subject: &str, kind: QuestionKind) -> Question {
    Question::new(
        QuestionId::new(id),
        vec![subject.to_string()],
        kind,
        format!("Question {id}"),
        vec!["A".into(), "B".into(), "C".into(), "D".into()],
    )
}

pub fn single(id: &str, subject: &str) -> Question {
    choice(id, subject, QuestionKind::SingleChoice)
}

/// Two subjects with two single-choice questions each.
pub fn two_by_two() -> Vec<Question> {
    vec![
        single("a1", "Physics"),
        single("a2", "Physics"),
        single("b1", "Chemistry"),
        single("b2", "Chemistry"),
    ]
}

pub struct Fixture {
    pub repo: InMemoryRepository,
    pub outbox: InMemoryOutbox,
    pub service: ExamService,
}

impl Fixture {
    /// Backend with a 180 minute test that started at the fixed timestamp.
    pub fn new(questions: Vec<Question>) -> Self {
        Self::with_meta(meta(180), questions)
    }

    pub fn with_meta(meta: TestMeta, questions: Vec<Question>) -> Self {
        let repo = InMemoryRepository::new();
        repo.insert_test(meta, questions).unwrap();
        repo.set_server_clock(Clock::fixed(fixed_now())).unwrap();
        let outbox = InMemoryOutbox::new();
        let storage = Storage::from_repository(repo.clone()).with_outbox(Arc::new(outbox.clone()));
        let service = ExamService::new(Clock::fixed(fixed_now()), storage);
        Self {
            repo,
            outbox,
            service,
        }
    }

    /// Move both the local and the server clock forward.
    pub fn advance(&self, delta: Duration) {
        self.service.clock().advance(delta);
        self.repo
            .set_server_clock(Clock::fixed(self.service.clock().local_now()))
            .unwrap();
    }

    /// A fresh service over the same backend and outbox, as after a restart.
    pub fn restart(&self) -> ExamService {
        let storage = Storage::from_repository(self.repo.clone())
            .with_outbox(Arc::new(self.outbox.clone()));
        ExamService::new(Clock::fixed(self.service.clock().local_now()), storage)
    }
}
