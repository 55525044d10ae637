use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Cancelled => "cancelled",
        }
    }

    /// Live attempts count against the one-attempt-per-test rule.
    pub fn is_live(&self) -> bool {
        !matches!(self, AttemptStatus::Cancelled)
    }
}

/// One user's pass at one test (`user_test_results` row).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub time_taken_minutes: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub test_id: i64,
    pub max_score: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct CompletedScore {
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub time_taken_minutes: i32,
}

/// Completed attempt joined with its test, for the student's history view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompletedAttemptRow {
    pub id: i64,
    pub test_id: i64,
    pub title: String,
    pub subject: Option<String>,
    pub duration_minutes: i32,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub completed_at: Option<DateTime<Utc>>,
}
