use std::sync::Arc;

use crate::dto::test_dto::{AvailableTest, PublicTest};
use crate::error::{Error, Result};
use crate::models::question::AnswerKey;
use crate::models::test::TestDefinition;
use crate::store::AttemptStore;

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn AttemptStore>,
}

impl TestService {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    pub async fn list_available(&self) -> Result<Vec<AvailableTest>> {
        let tests = self.store.list_active_tests().await?;
        Ok(tests.iter().map(AvailableTest::from).collect())
    }

    /// Loads a test that can be taken right now. Missing and inactive tests
    /// are indistinguishable to the caller.
    pub async fn find_active(&self, test_id: i64) -> Result<TestDefinition> {
        match self.store.find_test(test_id).await? {
            Some(test) if test.is_active => Ok(test),
            _ => Err(Error::NotFound(format!("Test {} not found", test_id))),
        }
    }

    /// Test with its questions, stripped of the answer key.
    pub async fn public_test(&self, test_id: i64) -> Result<PublicTest> {
        let test = self.find_active(test_id).await?;
        let questions = self.store.list_questions(test_id).await?;
        Ok(PublicTest::new(&test, &questions))
    }

    pub async fn answer_keys(&self, test_id: i64) -> Result<Vec<AnswerKey>> {
        let questions = self.store.list_questions(test_id).await?;
        Ok(questions.iter().map(AnswerKey::from).collect())
    }
}
