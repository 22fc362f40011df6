use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exam_core::model::{Question, TestId, TestMeta};
use storage::repository::{QuestionRepository, StorageError, TestRepository};
use tracing::debug;

/// A test and its questions in backend order.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub test: TestMeta,
    pub questions: Vec<Question>,
}

/// Read-through cache of test content, keyed by test id.
#[derive(Clone)]
pub struct TestCatalog {
    tests: Arc<dyn TestRepository>,
    questions: Arc<dyn QuestionRepository>,
    cache: Arc<Mutex<HashMap<TestId, CatalogEntry>>>,
}

impl TestCatalog {
    #[must_use]
    pub fn new(tests: Arc<dyn TestRepository>, questions: Arc<dyn QuestionRepository>) -> Self {
        Self {
            tests,
            questions,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<TestId, CatalogEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached entry, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the test or its questions cannot be fetched.
    pub async fn get(&self, test_id: &TestId) -> Result<CatalogEntry, StorageError> {
        if let Some(entry) = self.cache().get(test_id).cloned() {
            return Ok(entry);
        }
        self.refresh(test_id).await
    }

    /// Refetch and replace the cached entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the test or its questions cannot be fetched;
    /// the previous entry stays cached.
    pub async fn refresh(&self, test_id: &TestId) -> Result<CatalogEntry, StorageError> {
        let test = self.tests.get_test(test_id).await?;
        let questions = self.questions.list_questions(test_id).await?;
        debug!(test_id = %test_id, questions = questions.len(), "test content fetched");
        let entry = CatalogEntry { test, questions };
        self.cache().insert(test_id.clone(), entry.clone());
        Ok(entry)
    }

    pub fn invalidate(&self, test_id: &TestId) {
        self.cache().remove(test_id);
    }
}
