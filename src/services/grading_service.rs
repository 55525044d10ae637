use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::question::AnswerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub raw_score: i32,
    pub total_points: i32,
    pub percentage: i32,
    pub correct: usize,
}

pub struct GradingService;

impl GradingService {
    /// Sums the points of every correctly answered question. Unanswered and
    /// out-of-range selections score nothing.
    pub fn score(keys: &[AnswerKey], answers: &BTreeMap<i64, u8>) -> ScoreSummary {
        let mut raw_score = 0;
        let mut total_points = 0;
        let mut correct = 0;

        for key in keys {
            total_points += key.points;
            let given = answers.get(&key.question_id).copied();
            if given.is_some() && given == key.correct_option {
                raw_score += key.points;
                correct += 1;
            }
        }

        ScoreSummary {
            raw_score,
            total_points,
            percentage: Self::percentage_of(raw_score, total_points),
            correct,
        }
    }

    /// `round(raw / max * 100)`; a zero-point test scores 0%.
    pub fn percentage_of(raw_score: i32, max_score: i32) -> i32 {
        if max_score <= 0 {
            return 0;
        }
        ((raw_score as f64 / max_score as f64) * 100.0).round() as i32
    }
}
