use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::attempt::{
    Attempt, AttemptStatus, CompletedAttemptRow, CompletedScore, NewAttempt,
};
use crate::models::question::{Question, OPTION_LETTERS};
use crate::models::test::TestDefinition;
use crate::utils::time::now;

use super::AttemptStore;

#[derive(Default)]
struct Inner {
    tests: BTreeMap<i64, TestDefinition>,
    questions: BTreeMap<i64, Vec<Question>>,
    attempts: Vec<Attempt>,
    next_attempt_id: i64,
}

/// Process-local store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryAttemptStore {
    inner: Mutex<Inner>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with the three sample tests the app ships for offline use.
    pub fn with_demo_catalogue() -> Self {
        let store = Self::new();
        for (test, questions) in demo_catalogue() {
            // a fresh store cannot be poisoned
            let _ = store.insert_test(test, questions);
        }
        store
    }

    /// Registers a test together with its questions, replacing any previous
    /// definition with the same id.
    pub fn insert_test(&self, test: TestDefinition, questions: Vec<Question>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.questions.insert(test.id, questions);
        inner.tests.insert(test.id, test);
        Ok(())
    }

    /// Inserts an attempt row as-is, bypassing the live-attempt check.
    pub fn seed_attempt(&self, attempt: Attempt) -> Result<()> {
        let mut inner = self.lock()?;
        inner.next_attempt_id = inner.next_attempt_id.max(attempt.id);
        inner.attempts.push(attempt);
        Ok(())
    }

    pub fn attempts_for(&self, user_id: i64, test_id: i64) -> Result<Vec<Attempt>> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.test_id == test_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("attempt store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn find_test(&self, test_id: i64) -> Result<Option<TestDefinition>> {
        Ok(self.lock()?.tests.get(&test_id).cloned())
    }

    async fn list_active_tests(&self) -> Result<Vec<TestDefinition>> {
        let inner = self.lock()?;
        let mut tests: Vec<TestDefinition> =
            inner.tests.values().filter(|t| t.is_active).cloned().collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tests)
    }

    async fn list_questions(&self, test_id: i64) -> Result<Vec<Question>> {
        let inner = self.lock()?;
        let mut questions = inner.questions.get(&test_id).cloned().unwrap_or_default();
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn find_live_attempt(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .iter()
            .find(|a| a.user_id == user_id && a.test_id == test_id && a.status.is_live())
            .cloned())
    }

    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt> {
        let mut inner = self.lock()?;
        let taken = inner
            .attempts
            .iter()
            .any(|a| a.user_id == new.user_id && a.test_id == new.test_id && a.status.is_live());
        if taken {
            return Err(Error::Conflict(format!(
                "live attempt already exists for user {} on test {}",
                new.user_id, new.test_id
            )));
        }

        inner.next_attempt_id += 1;
        let attempt = Attempt {
            id: inner.next_attempt_id,
            user_id: new.user_id,
            test_id: new.test_id,
            score: 0,
            max_score: new.max_score,
            percentage: 0,
            time_taken_minutes: 0,
            status: AttemptStatus::InProgress,
            started_at: now(),
            completed_at: None,
        };
        inner.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, attempt_id: i64, user_id: i64) -> Result<Option<Attempt>> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .iter()
            .find(|a| a.id == attempt_id && a.user_id == user_id)
            .cloned())
    }

    async fn complete_attempt(
        &self,
        attempt_id: i64,
        user_id: i64,
        score: CompletedScore,
    ) -> Result<Option<Attempt>> {
        let mut inner = self.lock()?;
        let Some(attempt) = inner.attempts.iter_mut().find(|a| {
            a.id == attempt_id && a.user_id == user_id && a.status == AttemptStatus::InProgress
        }) else {
            return Ok(None);
        };

        attempt.score = score.score;
        attempt.max_score = score.max_score;
        attempt.percentage = score.percentage;
        attempt.time_taken_minutes = score.time_taken_minutes;
        attempt.status = AttemptStatus::Completed;
        attempt.completed_at = Some(now());
        Ok(Some(attempt.clone()))
    }

    async fn completed_for_user(&self, user_id: i64) -> Result<Vec<CompletedAttemptRow>> {
        let inner = self.lock()?;
        let mut rows: Vec<CompletedAttemptRow> = inner
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.status == AttemptStatus::Completed)
            .filter_map(|a| {
                let test = inner.tests.get(&a.test_id)?;
                Some(CompletedAttemptRow {
                    id: a.id,
                    test_id: a.test_id,
                    title: test.title.clone(),
                    subject: test.subject.clone(),
                    duration_minutes: test.duration_minutes,
                    score: a.score,
                    max_score: a.max_score,
                    percentage: a.percentage,
                    completed_at: a.completed_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

struct DemoQuestion {
    text: &'static str,
    options: [&'static str; 4],
    correct: usize,
    points: i32,
}

struct DemoTest {
    id: i64,
    title: &'static str,
    subject: &'static str,
    description: &'static str,
    duration_minutes: i32,
    difficulty: &'static str,
    questions: Vec<DemoQuestion>,
}

fn q(text: &'static str, options: [&'static str; 4], correct: usize, points: i32) -> DemoQuestion {
    DemoQuestion {
        text,
        options,
        correct,
        points,
    }
}

fn demo_catalogue() -> Vec<(TestDefinition, Vec<Question>)> {
    let demo = vec![
        DemoTest {
            id: 1,
            title: "Mathematics - Advanced Level",
            subject: "Mathematics",
            description: "Comprehensive mathematics test covering calculus, algebra, and geometry.",
            duration_minutes: 90,
            difficulty: "Advanced",
            questions: vec![
                q("What is the derivative of x² + 3x + 2?", ["2x + 3", "2x + 2", "x + 3", "2x + 5"], 0, 20),
                q("Solve for x: 2x + 5 = 13", ["x = 4", "x = 3", "x = 5", "x = 6"], 0, 20),
                q("What is the area of a circle with radius 5?", ["25π", "10π", "50π", "5π"], 0, 20),
                q("Find the limit as x approaches 0 of (sin x)/x", ["0", "1", "∞", "undefined"], 1, 20),
                q("What is the integral of 2x?", ["x²", "x² + C", "2x²", "x² + 2x"], 1, 20),
            ],
        },
        DemoTest {
            id: 2,
            title: "Computer Science Fundamentals",
            subject: "Computer Science",
            description: "Test your knowledge of programming concepts, algorithms, and data structures.",
            duration_minutes: 60,
            difficulty: "Intermediate",
            questions: vec![
                q("What is the time complexity of binary search?", ["O(n)", "O(log n)", "O(n²)", "O(1)"], 1, 25),
                q("Which data structure follows LIFO principle?", ["Queue", "Stack", "Array", "Linked List"], 1, 25),
                q("What is the output of: print(3 * 2 ** 2)", ["12", "36", "18", "6"], 0, 25),
            ],
        },
        DemoTest {
            id: 3,
            title: "Physics - Mechanics",
            subject: "Physics",
            description: "Advanced physics test focusing on mechanics, kinematics, and dynamics.",
            duration_minutes: 75,
            difficulty: "Advanced",
            questions: vec![
                q("What is the unit of force?", ["Joule", "Newton", "Watt", "Pascal"], 1, 21),
                q("What is the acceleration due to gravity?", ["9.8 m/s²", "10 m/s²", "8.9 m/s²", "11 m/s²"], 0, 21),
                q("What is the formula for kinetic energy?", ["mv", "½mv²", "mgh", "Fd"], 1, 21),
                q("What is the speed of light?", ["3 × 10⁸ m/s", "3 × 10⁶ m/s", "3 × 10⁹ m/s", "3 × 10⁷ m/s"], 0, 22),
            ],
        },
    ];

    let mut next_question_id = 0_i64;
    demo.into_iter()
        .map(|t| {
            let questions: Vec<Question> = t
                .questions
                .iter()
                .map(|dq| {
                    next_question_id += 1;
                    Question {
                        id: next_question_id,
                        test_id: t.id,
                        question_text: dq.text.to_string(),
                        option_a: dq.options[0].to_string(),
                        option_b: dq.options[1].to_string(),
                        option_c: dq.options[2].to_string(),
                        option_d: dq.options[3].to_string(),
                        correct_answer: OPTION_LETTERS[dq.correct].to_string(),
                        points: dq.points,
                        image_url: None,
                    }
                })
                .collect();
            let test = TestDefinition {
                id: t.id,
                title: t.title.to_string(),
                subject: Some(t.subject.to_string()),
                description: Some(t.description.to_string()),
                duration_minutes: t.duration_minutes,
                total_questions: questions.len() as i32,
                total_points: questions.iter().map(|q| q.points).sum(),
                difficulty: Some(t.difficulty.to_string()),
                is_active: true,
                created_at: None,
            };
            (test, questions)
        })
        .collect()
}
