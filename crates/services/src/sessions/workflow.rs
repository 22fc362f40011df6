use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{TestId, UserId};
use storage::repository::Storage;
use tracing::{info, instrument};

use super::loader::{SessionLoader, StartMode};
use super::notice::Notice;
use super::service::{ExamSession, SessionParts};
use super::submission::SubmissionController;
use super::sync::SyncEngine;
use crate::catalog::TestCatalog;
use crate::clock_source::ClockSource;
use crate::config::EngineConfig;
use crate::error::SessionError;

/// Orchestrates session start against injected storage.
#[derive(Clone)]
pub struct ExamService {
    clock: ClockSource,
    storage: Storage,
    catalog: TestCatalog,
    config: EngineConfig,
}

impl ExamService {
    #[must_use]
    pub fn new(clock: Clock, storage: Storage) -> Self {
        let clock = ClockSource::new(clock, Arc::clone(&storage.server_time));
        let catalog = TestCatalog::new(Arc::clone(&storage.tests), Arc::clone(&storage.questions));
        Self {
            clock,
            storage,
            catalog,
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a catalog with other services instead of the private one.
    #[must_use]
    pub fn with_catalog(mut self, catalog: TestCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn clock(&self) -> &ClockSource {
        &self.clock
    }

    #[must_use]
    pub fn catalog(&self) -> &TestCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Start or resume the live attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Expired` once the window has closed,
    /// `SessionError::NotStarted` before it opens, `SessionError::Empty` for a
    /// test without questions, or `SessionError::Storage` if the content cannot
    /// be fetched.
    pub async fn start_session(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<ExamSession, SessionError> {
        self.start(test_id, user_id, StartMode::Live).await
    }

    /// Start a practice attempt of a test whose window has closed. The
    /// countdown runs for the full duration from now.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StillRunning` while the live window is open, and
    /// otherwise the same errors as [`ExamService::start_session`].
    pub async fn start_retake(
        &self,
        test_id: &TestId,
        user_id: &UserId,
    ) -> Result<ExamSession, SessionError> {
        self.start(test_id, user_id, StartMode::Retake).await
    }

    #[instrument(skip(self, test_id, user_id), fields(test_id = %test_id, user_id = %user_id))]
    async fn start(
        &self,
        test_id: &TestId,
        user_id: &UserId,
        mode: StartMode,
    ) -> Result<ExamSession, SessionError> {
        let mut notices = Vec::new();
        if let Err(err) = self.clock.resync().await {
            notices.push(Notice::ClockDegraded {
                reason: err.to_string(),
            });
        }
        let now = self.clock.now();

        let loader = SessionLoader {
            catalog: &self.catalog,
            answers: self.storage.answers.as_ref(),
            outbox: self.storage.outbox.as_ref(),
        };
        let mut loaded = loader.load(test_id, user_id, now, mode).await?;

        let (mut sync, outcomes) = SyncEngine::new(
            user_id.clone(),
            test_id.clone(),
            loaded.test.test_type.clone(),
            loaded.attempt,
            Arc::clone(&self.storage.answers),
            Arc::clone(&self.storage.outbox),
        );
        sync.seed_failed(std::mem::take(&mut loaded.recovered));
        let submission = SubmissionController::new(
            user_id.clone(),
            test_id.clone(),
            Arc::clone(&self.storage.submissions),
            self.config.redirect_delay,
        );
        let session = ExamSession::new(SessionParts {
            user_id: user_id.clone(),
            loaded,
            clock: self.clock.clone(),
            sync,
            outcomes,
            submission,
            notices,
        });
        info!(
            live = session.attempt().is_live(),
            remaining_secs = session.remaining_secs(),
            "session started"
        );
        Ok(session)
    }
}
