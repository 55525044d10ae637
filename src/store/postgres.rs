use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::attempt::{Attempt, CompletedAttemptRow, CompletedScore, NewAttempt};
use crate::models::question::Question;
use crate::models::test::TestDefinition;

use super::AttemptStore;

const TEST_COLUMNS: &str = "id, title, subject, description, duration_minutes, total_questions, \
     total_points, difficulty, is_active, created_at";

#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn find_test(&self, test_id: i64) -> Result<Option<TestDefinition>> {
        let test = sqlx::query_as::<_, TestDefinition>(&format!(
            "SELECT {} FROM tests WHERE id = $1",
            TEST_COLUMNS
        ))
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(test)
    }

    async fn list_active_tests(&self) -> Result<Vec<TestDefinition>> {
        let tests = sqlx::query_as::<_, TestDefinition>(&format!(
            "SELECT {} FROM tests WHERE is_active = TRUE ORDER BY created_at DESC, id DESC",
            TEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    async fn list_questions(&self, test_id: i64) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, test_id, question_text, option_a, option_b, option_c, option_d,
                   correct_answer, points, image_url
            FROM questions
            WHERE test_id = $1
            ORDER BY id
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn find_live_attempt(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT * FROM user_test_results
            WHERE user_id = $1 AND test_id = $2 AND status <> 'cancelled'
            "#,
        )
        .bind(user_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt> {
        // unique violation on the partial index converts to Error::Conflict
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            INSERT INTO user_test_results (user_id, test_id, score, max_score, percentage, status)
            VALUES ($1, $2, 0, $3, 0, 'in_progress')
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.test_id)
        .bind(new.max_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt_id: i64, user_id: i64) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"SELECT * FROM user_test_results WHERE id = $1 AND user_id = $2"#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn complete_attempt(
        &self,
        attempt_id: i64,
        user_id: i64,
        score: CompletedScore,
    ) -> Result<Option<Attempt>> {
        let attempt = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE user_test_results
            SET score = $3,
                max_score = $4,
                percentage = $5,
                time_taken_minutes = $6,
                status = 'completed',
                completed_at = NOW()
            WHERE id = $1 AND user_id = $2 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .bind(score.score)
        .bind(score.max_score)
        .bind(score.percentage)
        .bind(score.time_taken_minutes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn completed_for_user(&self, user_id: i64) -> Result<Vec<CompletedAttemptRow>> {
        let rows = sqlx::query_as::<_, CompletedAttemptRow>(
            r#"
            SELECT r.id, r.test_id, t.title, t.subject, t.duration_minutes,
                   r.score, r.max_score, r.percentage, r.completed_at
            FROM user_test_results r
            JOIN tests t ON t.id = r.test_id
            WHERE r.user_id = $1 AND r.status = 'completed'
            ORDER BY r.completed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
