use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const OPTION_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// A stored question, answer key included. Never serialize this to a client;
/// use [`crate::dto::test_dto::PublicQuestion`] instead.
#[derive(Debug, Clone, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,
    pub question_text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_answer: String,
    pub points: i32,
    pub image_url: Option<String>,
}

impl Question {
    pub fn options(&self) -> Vec<String> {
        vec![
            self.option_a.clone(),
            self.option_b.clone(),
            self.option_c.clone(),
            self.option_d.clone(),
        ]
    }

    /// Zero-based index of the correct option, `None` for a malformed key.
    pub fn correct_index(&self) -> Option<u8> {
        let letter = self.correct_answer.trim().chars().next()?.to_ascii_uppercase();
        OPTION_LETTERS
            .iter()
            .position(|l| *l == letter)
            .map(|idx| idx as u8)
    }
}

/// Scoring-only view of a question: what the grader needs and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey {
    pub question_id: i64,
    pub correct_option: Option<u8>,
    pub points: i32,
}

impl From<&Question> for AnswerKey {
    fn from(q: &Question) -> Self {
        Self {
            question_id: q.id,
            correct_option: q.correct_index(),
            points: q.points,
        }
    }
}
