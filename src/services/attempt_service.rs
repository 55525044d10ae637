use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::test_dto::{
    StartTestResponse, StartedTestSummary, SubmitTestRequest, SubmitTestResponse,
};
use crate::error::{Error, Result};
use crate::models::attempt::{
    Attempt, AttemptStatus, CompletedAttemptRow, CompletedScore, NewAttempt,
};
use crate::models::test::TestDefinition;
use crate::services::event_bus::{AttemptEvent, EventBus};
use crate::services::grading_service::GradingService;
use crate::services::test_service::TestService;
use crate::store::AttemptStore;
use crate::utils::time::now;

#[derive(Debug, Clone)]
pub struct StartedAttempt {
    pub attempt: Attempt,
    pub test: TestDefinition,
    pub resumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedAttempt {
    pub attempt_id: i64,
    pub score: i32,
    pub percentage: i32,
    pub max_score: i32,
    /// `true` when the attempt had already been finalized by an earlier call.
    pub already_completed: bool,
}

impl FinalizedAttempt {
    fn from_attempt(attempt: &Attempt, already_completed: bool) -> Self {
        Self {
            attempt_id: attempt.id,
            score: attempt.score,
            percentage: attempt.percentage,
            max_score: attempt.max_score,
            already_completed,
        }
    }
}

impl From<StartedAttempt> for StartTestResponse {
    fn from(started: StartedAttempt) -> Self {
        let message = if started.resumed {
            "Resuming existing attempt"
        } else {
            "Test started successfully"
        };
        Self {
            attempt_id: started.attempt.id,
            status: started.attempt.status,
            resumed: started.resumed,
            test: StartedTestSummary {
                id: started.test.id,
                title: started.test.title,
                duration_minutes: started.test.duration_minutes,
                total_points: started.test.total_points,
            },
            message: message.to_string(),
        }
    }
}

impl From<FinalizedAttempt> for SubmitTestResponse {
    fn from(result: FinalizedAttempt) -> Self {
        let message = if result.already_completed {
            "Test already submitted"
        } else {
            "Test submitted successfully"
        };
        Self {
            attempt_id: result.attempt_id,
            score: result.score,
            percentage: result.percentage,
            max_score: result.max_score,
            already_completed: result.already_completed,
            message: message.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    tests: TestService,
    events: EventBus,
}

impl AttemptService {
    pub fn new(store: Arc<dyn AttemptStore>, tests: TestService, events: EventBus) -> Self {
        Self {
            store,
            tests,
            events,
        }
    }

    /// Returns the caller's live attempt for the test, creating one if none
    /// exists. Concurrent callers converge on the same attempt.
    pub async fn start_or_resume(&self, user_id: i64, test_id: i64) -> Result<StartedAttempt> {
        let test = self.tests.find_active(test_id).await?;

        if let Some(attempt) = self.store.find_live_attempt(user_id, test_id).await? {
            tracing::info!(
                attempt_id = attempt.id,
                user_id,
                test_id,
                status = attempt.status.as_str(),
                "Resuming existing attempt"
            );
            return Ok(StartedAttempt {
                attempt,
                test,
                resumed: true,
            });
        }

        let new = NewAttempt {
            user_id,
            test_id,
            max_score: test.total_points,
        };
        match self.store.insert_attempt(new).await {
            Ok(attempt) => {
                tracing::info!(attempt_id = attempt.id, user_id, test_id, "Attempt started");
                self.events.publish(AttemptEvent::Started {
                    event_id: Uuid::new_v4(),
                    attempt_id: attempt.id,
                    user_id,
                    test_id,
                    at: attempt.started_at,
                });
                Ok(StartedAttempt {
                    attempt,
                    test,
                    resumed: false,
                })
            }
            Err(Error::Conflict(_)) => {
                tracing::warn!(user_id, test_id, "Concurrent start detected, re-reading attempt");
                let attempt = self
                    .store
                    .find_live_attempt(user_id, test_id)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal("live attempt vanished after conflict".to_string())
                    })?;
                Ok(StartedAttempt {
                    attempt,
                    test,
                    resumed: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Scores and completes an attempt. A second call for an already
    /// completed attempt returns the stored result untouched.
    pub async fn finalize(
        &self,
        attempt_id: i64,
        user_id: i64,
        raw_score: i32,
        time_taken_minutes: i32,
    ) -> Result<FinalizedAttempt> {
        if raw_score < 0 || time_taken_minutes < 0 {
            return Err(Error::BadRequest(
                "score and time taken must not be negative".to_string(),
            ));
        }

        let attempt = self.owned_attempt(attempt_id, user_id).await?;
        match attempt.status {
            AttemptStatus::Completed => {
                tracing::info!(attempt_id, user_id, "Duplicate finalize absorbed");
                return Ok(FinalizedAttempt::from_attempt(&attempt, true));
            }
            AttemptStatus::Cancelled => {
                return Err(Error::BadRequest(format!(
                    "Attempt {} was cancelled",
                    attempt_id
                )));
            }
            AttemptStatus::InProgress => {}
        }

        let score = CompletedScore {
            score: raw_score,
            max_score: attempt.max_score,
            percentage: GradingService::percentage_of(raw_score, attempt.max_score),
            time_taken_minutes,
        };

        match self.store.complete_attempt(attempt_id, user_id, score).await? {
            Some(done) => {
                tracing::info!(
                    attempt_id,
                    user_id,
                    score = done.score,
                    percentage = done.percentage,
                    "Attempt completed"
                );
                self.events.publish(AttemptEvent::Completed {
                    event_id: Uuid::new_v4(),
                    attempt_id,
                    user_id,
                    test_id: done.test_id,
                    score: done.score,
                    max_score: done.max_score,
                    percentage: done.percentage,
                    at: done.completed_at.unwrap_or_else(now),
                });
                Ok(FinalizedAttempt::from_attempt(&done, false))
            }
            None => {
                // lost the race to another finalizer
                let current = self.owned_attempt(attempt_id, user_id).await?;
                if current.status == AttemptStatus::Completed {
                    tracing::warn!(attempt_id, user_id, "Concurrent finalize absorbed");
                    Ok(FinalizedAttempt::from_attempt(&current, true))
                } else {
                    Err(Error::Conflict(format!(
                        "Attempt {} is no longer in progress",
                        attempt_id
                    )))
                }
            }
        }
    }

    /// Grades a submitted answer map against the stored key, then finalizes.
    pub async fn submit_answers(
        &self,
        user_id: i64,
        req: &SubmitTestRequest,
    ) -> Result<FinalizedAttempt> {
        let attempt = self.owned_attempt(req.attempt_id, user_id).await?;
        if attempt.status == AttemptStatus::Completed {
            return Ok(FinalizedAttempt::from_attempt(&attempt, true));
        }

        let keys = self.tests.answer_keys(attempt.test_id).await?;
        let summary = GradingService::score(&keys, &req.answers);
        tracing::debug!(
            attempt_id = attempt.id,
            correct = summary.correct,
            raw_score = summary.raw_score,
            "Graded submission"
        );
        self.finalize(attempt.id, user_id, summary.raw_score, req.time_taken_minutes)
            .await
    }

    pub async fn completed_for_user(&self, user_id: i64) -> Result<Vec<CompletedAttemptRow>> {
        self.store.completed_for_user(user_id).await
    }

    async fn owned_attempt(&self, attempt_id: i64, user_id: i64) -> Result<Attempt> {
        self.store
            .find_attempt(attempt_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }
}
