use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{AnswerRecord, Question, TestId, TestMeta, UserId};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::repository::{
    AnswerRepository, QuestionRepository, Storage, StorageError,
    SubmissionRepository, TestRepository, TimeSource,
};

mod payload;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpConfigError {
    #[error("EXAM_API_TIMEOUT_SECS must be a positive number of seconds, got {raw:?}")]
    InvalidTimeout { raw: String },
}

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl HttpConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `EXAM_API_BASE_URL`, `EXAM_API_TOKEN` and `EXAM_API_TIMEOUT_SECS`.
    ///
    /// Returns `Ok(None)` when no base URL is configured.
    ///
    /// # Errors
    ///
    /// Returns `HttpConfigError` if the timeout is not a positive number of seconds.
    pub fn from_env() -> Result<Option<Self>, HttpConfigError> {
        let lookup = |key: &str| env::var(key).ok();
        match lookup("EXAM_API_BASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(base_url) => Self::new(base_url).with_overrides(lookup).map(Some),
            None => Ok(None),
        }
    }

    /// Apply the token and timeout settings found through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `HttpConfigError` if the timeout is not a positive number of seconds.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, HttpConfigError> {
        if let Some(token) = lookup("EXAM_API_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(raw) = lookup("EXAM_API_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(HttpConfigError::InvalidTimeout { raw })?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// REST client for the exam backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    user_id: &'a UserId,
    test_id: &'a TestId,
}

fn transport(e: reqwest::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { client, config })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StorageError> {
        let response = self.authorize(request).send().await.map_err(transport)?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound),
            StatusCode::CONFLICT => Err(StorageError::Conflict),
            status => Err(StorageError::Status(status.as_u16())),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, StorageError> {
        let request = self.client.get(self.config.url(path)).query(query);
        let response = self.send(request).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), StorageError> {
        let request = self.client.post(self.config.url(path)).json(body);
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl TestRepository for HttpBackend {
    async fn get_test(&self, id: &TestId) -> Result<TestMeta, StorageError> {
        let body = self.get_json(&format!("tests/{id}"), &[]).await?;
        payload::parse_test(body)
    }
}

#[async_trait]
impl QuestionRepository for HttpBackend {
    async fn list_questions(&self, test_id: &TestId) -> Result<Vec<Question>, StorageError> {
        let body = self
            .get_json(&format!("tests/{test_id}/questions"), &[])
            .await?;
        payload::parse_questions(body)
    }
}

#[async_trait]
impl AnswerRepository for HttpBackend {
    async fn previous_answers(
        &self,
        user_id: &UserId,
        test_id: &TestId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let query = [("userId", user_id.as_str()), ("testId", test_id.as_str())];
        let body = self.get_json("answers", &query).await?;
        payload::parse_records(body)
    }

    async fn upsert_answer(&self, record: &AnswerRecord) -> Result<(), StorageError> {
        self.post_json("answers", record).await
    }
}

#[async_trait]
impl SubmissionRepository for HttpBackend {
    async fn submit_test(&self, user_id: &UserId, test_id: &TestId) -> Result<(), StorageError> {
        self.post_json("tests/submit", &SubmitRequest { user_id, test_id })
            .await
    }
}

#[async_trait]
impl TimeSource for HttpBackend {
    async fn server_time(&self) -> Result<DateTime<Utc>, StorageError> {
        let body = self.get_json("time", &[]).await?;
        payload::parse_server_time(body)
    }
}

impl Storage {
    /// Build a `Storage` talking to the REST backend, with an in-memory outbox.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the HTTP client cannot be built.
    pub fn http(config: HttpConfig) -> Result<Self, StorageError> {
        let backend = HttpBackend::new(config)?;
        Ok(Self::from_repository(backend))
    }
}
