//! Persistence seam for tests, questions and attempts.
//!
//! Both backends enforce the same rule: at most one non-cancelled attempt per
//! (user, test). A duplicate insert surfaces as [`Error::Conflict`] so callers
//! can re-fetch the winner instead of failing.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::attempt::{Attempt, CompletedAttemptRow, CompletedScore, NewAttempt};
use crate::models::question::Question;
use crate::models::test::TestDefinition;

pub use memory::MemoryAttemptStore;
pub use postgres::PgAttemptStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_test(&self, test_id: i64) -> Result<Option<TestDefinition>>;

    /// Active tests, newest first.
    async fn list_active_tests(&self) -> Result<Vec<TestDefinition>>;

    /// Questions of a test ordered by id.
    async fn list_questions(&self, test_id: i64) -> Result<Vec<Question>>;

    async fn find_live_attempt(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>>;

    /// Inserts an `in_progress` attempt. Returns `Error::Conflict` when a live
    /// attempt for the same (user, test) already exists.
    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt>;

    async fn find_attempt(&self, attempt_id: i64, user_id: i64) -> Result<Option<Attempt>>;

    /// Moves an `in_progress` attempt to `completed`. Returns `None` when the
    /// attempt was not in progress (already finalized, cancelled or missing).
    async fn complete_attempt(
        &self,
        attempt_id: i64,
        user_id: i64,
        score: CompletedScore,
    ) -> Result<Option<Attempt>>;

    async fn completed_for_user(&self, user_id: i64) -> Result<Vec<CompletedAttemptRow>>;
}
