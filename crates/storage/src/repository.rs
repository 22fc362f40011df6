use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::{AnswerRecord, Question, RecordId, TestId, TestMeta, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend responded with status {0}")]
    Status(u16),
}

/// Source of scheduled test metadata.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Fetch a test by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_test(&self, id: &TestId) -> Result<TestMeta, StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Fetch the ordered question list of a test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be loaded.
    async fn list_questions(&self, test_id: &TestId) -> Result<Vec<Question>, StorageError>;
}

/// Remote sink and source of answer records.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Records previously persisted for this user and test.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be fetched.
    async fn previous_answers(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Insert or overwrite the record with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write is rejected or the backend is unreachable.
    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Finalize the attempt server-side.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the submission is not acknowledged.
    async fn submit_test(&self, user_id: &UserId, test_id: &TestId) -> Result<(), StorageError>;
}

/// Authoritative clock.
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the server time cannot be read.
    async fn server_time(&self) -> Result<DateTime<Utc>, StorageError>;
}

/// Local holding area for records whose remote write has not been confirmed.
#[async_trait]
pub trait AnswerOutbox: Send + Sync {
    /// Stage a record, replacing any staged record with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored locally.
    async fn stage(&self, record: &AnswerRecord) -> Result<(), StorageError>;

    /// Drop a staged record once it has been delivered.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the local store fails.
    async fn remove(&self, id: &RecordId) -> Result<(), StorageError>;

    /// Staged records for a user and test, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the local store fails.
    async fn pending(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

fn belongs_to(record: &AnswerRecord, user_id: &UserId, test_id: &TestId) -> bool {
    &record.user_id == user_id && &record.solved_during_test.test_id == test_id
}

#[derive(Default)]
struct Faults {
    answers: AtomicBool,
    previous: AtomicBool,
    submissions: AtomicBool,
    time: AtomicBool,
}

#[derive(Default)]
struct Counters {
    answer_writes: AtomicUsize,
    question_fetches: AtomicUsize,
}

/// Simple in-memory backend for testing and prototyping.
///
/// Every operation can be made to fail on demand to simulate an unreachable backend.
#[derive(Clone)]
pub struct InMemoryRepository {
    tests: Arc<Mutex<HashMap<TestId, TestMeta>>>,
    questions: Arc<Mutex<HashMap<TestId, Vec<Question>>>>,
    answers: Arc<Mutex<HashMap<RecordId, AnswerRecord>>>,
    submissions: Arc<Mutex<Vec<(UserId, TestId)>>>,
    server_clock: Arc<Mutex<Clock>>,
    faults: Arc<Faults>,
    counters: Arc<Counters>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tests: Arc::new(Mutex::new(HashMap::new())),
            questions: Arc::new(Mutex::new(HashMap::new())),
            answers: Arc::new(Mutex::new(HashMap::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
            server_clock: Arc::new(Mutex::new(Clock::default_clock())),
            faults: Arc::new(Faults::default()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Register a test together with its ordered questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if a lock is poisoned.
    pub fn insert_test(&self, test: TestMeta, questions: Vec<Question>) -> Result<(), StorageError> {
        lock(&self.questions)?.insert(test.id.clone(), questions);
        lock(&self.tests)?.insert(test.id.clone(), test);
        Ok(())
    }

    /// Seed a previously persisted record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if a lock is poisoned.
    pub fn insert_answer(&self, record: AnswerRecord) -> Result<(), StorageError> {
        lock(&self.answers)?.insert(record.id.clone(), record);
        Ok(())
    }

    /// Serve `server_time` from this clock instead of system time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if a lock is poisoned.
    pub fn set_server_clock(&self, clock: Clock) -> Result<(), StorageError> {
        *lock(&self.server_clock)? = clock;
        Ok(())
    }

    pub fn fail_answer_writes(&self, fail: bool) {
        self.faults.answers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_previous_answers(&self, fail: bool) {
        self.faults.previous.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.faults.submissions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_server_time(&self, fail: bool) {
        self.faults.time.store(fail, Ordering::SeqCst);
    }

    /// Number of answer upserts attempted, including failed ones.
    #[must_use]
    pub fn answer_write_count(&self) -> usize {
        self.counters.answer_writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn question_fetch_count(&self) -> usize {
        self.counters.question_fetches.load(Ordering::SeqCst)
    }

    /// Stored record by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if absent.
    pub fn answer(&self, id: &RecordId) -> Result<AnswerRecord, StorageError> {
        lock(&self.answers)?
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Number of distinct stored records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if a lock is poisoned.
    pub fn answer_count(&self) -> Result<usize, StorageError> {
        Ok(lock(&self.answers)?.len())
    }

    /// Submissions received so far.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if a lock is poisoned.
    pub fn submissions(&self) -> Result<Vec<(UserId, TestId)>, StorageError> {
        Ok(lock(&self.submissions)?.clone())
    }
}

fn unreachable_backend() -> StorageError {
    StorageError::Connection("backend unreachable".into())
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn get_test(&self, id: &TestId) -> Result<TestMeta, StorageError> {
        lock(&self.tests)?
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn list_questions(&self, test_id: &TestId) -> Result<Vec<Question>, StorageError> {
        self.counters.question_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.questions)?
            .get(test_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn previous_answers(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        if self.faults.previous.load(Ordering::SeqCst) {
            return Err(unreachable_backend());
        }
        let guard = lock(&self.answers)?;
        let mut found: Vec<_> = guard
            .values()
            .filter(|r| belongs_to(r, user_id, test_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.submitted_at);
        Ok(found)
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        self.counters.answer_writes.fetch_add(1, Ordering::SeqCst);
        if self.faults.answers.load(Ordering::SeqCst) {
            return Err(unreachable_backend());
        }
        lock(&self.answers)?.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn submit_test(&self, user_id: &UserId, test_id: &TestId) -> Result<(), StorageError> {
        if self.faults.submissions.load(Ordering::SeqCst) {
            return Err(unreachable_backend());
        }
        lock(&self.submissions)?.push((user_id.clone(), test_id.clone()));
        Ok(())
    }
}

#[async_trait]
impl TimeSource for InMemoryRepository {
    async fn server_time(&self) -> Result<DateTime<Utc>, StorageError> {
        if self.faults.time.load(Ordering::SeqCst) {
            return Err(unreachable_backend());
        }
        Ok(lock(&self.server_clock)?.now())
    }
}

/// Outbox kept in process memory; lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    staged: Arc<Mutex<HashMap<RecordId, AnswerRecord>>>,
}

impl InMemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnswerOutbox for InMemoryOutbox {
    async fn stage(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        lock(&self.staged)?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, id: &RecordId) -> Result<(), StorageError> {
        lock(&self.staged)?.remove(id);
        Ok(())
    }

    async fn pending(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = lock(&self.staged)?;
        let mut found: Vec<_> = guard
            .values()
            .filter(|r| belongs_to(r, user_id, test_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.submitted_at);
        Ok(found)
    }
}

/// Aggregates the backend contracts behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tests: Arc<dyn TestRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub server_time: Arc<dyn TimeSource>,
    pub outbox: Arc<dyn AnswerOutbox>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one backend for every remote concern, with an in-memory outbox.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: TestRepository
            + QuestionRepository
            + AnswerRepository
            + SubmissionRepository
            + TimeSource
            + Clone
            + 'static,
    {
        Self {
            tests: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            answers: Arc::new(repo.clone()),
            submissions: Arc::new(repo.clone()),
            server_time: Arc::new(repo),
            outbox: Arc::new(InMemoryOutbox::new()),
        }
    }

    #[must_use]
    pub fn with_outbox(mut self, outbox: Arc<dyn AnswerOutbox>) -> Self {
        self.outbox = outbox;
        self
    }
}
