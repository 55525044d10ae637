use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::attempt::{AttemptStatus, CompletedAttemptRow};
use crate::models::question::Question;
use crate::models::test::TestDefinition;

/// Question as shipped to the test taker. Carries no answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub points: i32,
    pub image_url: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question: q.question_text.clone(),
            options: q.options(),
            points: q.points,
            image_url: q.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTest {
    pub id: i64,
    pub title: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub total_questions: i32,
    pub total_points: i32,
    pub difficulty: Option<String>,
    pub questions: Vec<PublicQuestion>,
}

impl PublicTest {
    pub fn new(test: &TestDefinition, questions: &[Question]) -> Self {
        Self {
            id: test.id,
            title: test.title.clone(),
            subject: test.subject.clone(),
            description: test.description.clone(),
            duration_minutes: test.duration_minutes,
            total_questions: test.total_questions,
            total_points: test.total_points,
            difficulty: test.difficulty.clone(),
            questions: questions.iter().map(PublicQuestion::from).collect(),
        }
    }

    pub fn duration_seconds(&self) -> u32 {
        (self.duration_minutes.max(0) as u32) * 60
    }

    pub fn question(&self, question_id: i64) -> Option<&PublicQuestion> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTestEnvelope {
    pub test: PublicTest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTest {
    pub id: i64,
    pub title: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub questions: i32,
    pub points: i32,
    pub difficulty: Option<String>,
}

impl From<&TestDefinition> for AvailableTest {
    fn from(t: &TestDefinition) -> Self {
        Self {
            id: t.id,
            title: t.title.clone(),
            subject: t.subject.clone(),
            description: t.description.clone(),
            duration_minutes: t.duration_minutes,
            questions: t.total_questions,
            points: t.total_points,
            difficulty: t.difficulty.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTestsResponse {
    pub tests: Vec<AvailableTest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedTestSummary {
    pub id: i64,
    pub title: String,
    pub duration_minutes: i32,
    pub total_points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTestResponse {
    pub attempt_id: i64,
    pub status: AttemptStatus,
    pub resumed: bool,
    pub test: StartedTestSummary,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SubmitTestRequest {
    pub attempt_id: i64,
    /// question id → selected option index
    #[serde(default)]
    pub answers: BTreeMap<i64, u8>,
    #[validate(range(min = 0))]
    pub time_taken_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTestResponse {
    pub attempt_id: i64,
    pub score: i32,
    pub percentage: i32,
    pub max_score: i32,
    pub already_completed: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTestsResponse {
    pub tests: Vec<CompletedAttemptRow>,
}
