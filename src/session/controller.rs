//! The proctored test-taking state machine.
//!
//! ```text
//! loading -> awaiting_consent -> active <-> active(paused) -> submitting -> terminated
//!    \  \             \                                         ^
//!     \  `-------------`--> error                                |
//!      `----------------------------------------------------------'
//! ```
//!
//! The bottom edge is a reload that finds a frozen submission in the snapshot.
//!
//! All methods run on one cooperative task. The only awaits are network calls
//! and capability requests; submission is guarded by a flag that is set
//! before the first await.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ProctoringConfig;
use crate::dto::test_dto::{PublicQuestion, PublicTest, SubmitTestRequest, SubmitTestResponse};
use crate::models::attempt::AttemptStatus;
use crate::utils::time::now;

use super::capabilities::Capabilities;
use super::client::AttemptApi;
use super::integrity::{IntegrityEvent, IntegrityMonitor, InputAction, KeyChord};
use super::snapshot::{ProgressSnapshot, SnapshotStore};
use super::timer::Countdown;
use super::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    Submitted(SubmitTestResponse),
    /// The server already held a completed attempt when the session loaded.
    AlreadyCompleted,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    AwaitingConsent,
    Active { paused: bool },
    Submitting,
    Terminated(TerminalReason),
    Error(String),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self, SessionState::Terminated(_) | SessionState::Error(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimeExpired,
    FocusLost,
    FaceLimit,
}

/// Final answers and elapsed time frozen at the moment of submission. Kept
/// until the backend acknowledges it so retries send the same payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub request: SubmitTestRequest,
    pub trigger: SubmitTrigger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Integrity(IntegrityEvent),
    CameraError(String),
    FullscreenError(String),
    SubmitFailed(String),
    Completed(SubmitTestResponse),
}

pub struct SessionController<A, S> {
    test_id: i64,
    api: A,
    snapshots: S,
    monitor: IntegrityMonitor,
    state: SessionState,
    test: Option<PublicTest>,
    attempt_id: Option<i64>,
    answers: BTreeMap<i64, u8>,
    current: usize,
    countdown: Countdown,
    online: bool,
    submit_started: bool,
    finalized: bool,
    restored: bool,
    pending: Option<PendingSubmission>,
    last_error: Option<String>,
    notices: Vec<SessionNotice>,
}

impl<A: AttemptApi, S: SnapshotStore> SessionController<A, S> {
    pub fn new(
        test_id: i64,
        api: A,
        snapshots: S,
        capabilities: Capabilities,
        config: &ProctoringConfig,
    ) -> Self {
        Self {
            test_id,
            api,
            snapshots,
            monitor: IntegrityMonitor::new(capabilities, config.max_face_strikes),
            state: SessionState::Loading,
            test: None,
            attempt_id: None,
            answers: BTreeMap::new(),
            current: 0,
            countdown: Countdown::new(0),
            online: true,
            submit_started: false,
            finalized: false,
            restored: false,
            pending: None,
            last_error: None,
            notices: Vec::new(),
        }
    }

    /// Fetches the test, starts or resumes the attempt and rehydrates from a
    /// matching snapshot. Neither the timer nor the monitor start here.
    pub async fn load(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Loading {
            return Err(SessionError::NotActive);
        }

        let test = match self.api.fetch_test(self.test_id).await {
            Ok(test) => test,
            Err(e) => return Err(self.fail(format!("Failed to load test: {}", e), e)),
        };
        let started = match self.api.start_or_resume(self.test_id).await {
            Ok(started) => started,
            Err(e) => return Err(self.fail(format!("Failed to start test: {}", e), e)),
        };

        if started.status == AttemptStatus::Completed {
            tracing::info!(
                test_id = self.test_id,
                attempt_id = started.attempt_id,
                "Attempt already completed"
            );
            self.attempt_id = Some(started.attempt_id);
            self.submit_started = true;
            self.finalized = true;
            self.discard_snapshot();
            self.monitor.stop();
            self.state = SessionState::Terminated(TerminalReason::AlreadyCompleted);
            return Ok(());
        }

        self.attempt_id = Some(started.attempt_id);
        self.countdown = Countdown::new(test.duration_seconds());
        self.rehydrate(&test, started.attempt_id);
        self.test = Some(test);

        if let Some(pending) = &self.pending {
            // a frozen submission never reopens the test
            tracing::info!(
                test_id = self.test_id,
                attempt_id = started.attempt_id,
                trigger = ?pending.trigger,
                "Resuming unsent submission"
            );
            self.submit_started = true;
            self.countdown.pause();
            self.monitor.stop();
            self.state = SessionState::Submitting;
            return Ok(());
        }

        tracing::info!(
            test_id = self.test_id,
            attempt_id = started.attempt_id,
            resumed = started.resumed,
            restored = self.restored,
            remaining = self.countdown.remaining(),
            "Session loaded"
        );
        self.state = SessionState::AwaitingConsent;
        Ok(())
    }

    /// Camera failures keep the session waiting for consent; the caller may retry.
    pub async fn grant_camera(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingConsent {
            return Err(SessionError::NotActive);
        }
        if let Err(e) = self.monitor.acquire_camera().await {
            tracing::warn!(error = %e, "Camera access failed");
            self.notices.push(SessionNotice::CameraError(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn enter_fullscreen(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingConsent {
            return Err(SessionError::NotActive);
        }
        if let Err(e) = self.monitor.enter_fullscreen().await {
            tracing::warn!(error = %e, "Fullscreen request failed");
            self.notices.push(SessionNotice::FullscreenError(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Starts the timer and the monitor once camera and fullscreen are both held.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::AwaitingConsent {
            return Err(SessionError::NotActive);
        }
        let camera = self.monitor.has_camera();
        let fullscreen = self.monitor.is_fullscreen();
        if !camera || !fullscreen {
            return Err(SessionError::ConsentIncomplete { camera, fullscreen });
        }

        self.monitor.start();
        if !self.online {
            self.countdown.pause();
        }
        self.state = SessionState::Active {
            paused: !self.online,
        };
        tracing::info!(
            attempt_id = ?self.attempt_id,
            remaining = self.countdown.remaining(),
            "Session active"
        );
        self.persist();
        Ok(())
    }

    /// One-second heartbeat. Persists progress and auto-submits at zero.
    pub async fn tick(&mut self) -> Result<(), SessionError> {
        if self.state != (SessionState::Active { paused: false }) {
            return Ok(());
        }
        if let Some(ev) = self.monitor.check_camera() {
            self.notices.push(SessionNotice::Integrity(ev));
        }

        self.countdown.tick();
        self.persist();
        if self.countdown.is_expired() {
            tracing::info!(attempt_id = ?self.attempt_id, "Time expired");
            return self.submit_with(SubmitTrigger::TimeExpired).await;
        }
        Ok(())
    }

    pub fn select_answer(&mut self, question_id: i64, option: u8) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::NotActive);
        }
        let question = self
            .test
            .as_ref()
            .and_then(|t| t.question(question_id))
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        if usize::from(option) >= question.options.len() {
            return Err(SessionError::InvalidOption {
                question_id,
                option,
            });
        }

        self.answers.insert(question_id, option);
        self.persist();
        Ok(())
    }

    pub fn jump_to(&mut self, index: usize) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::NotActive);
        }
        if index >= self.question_count() {
            return Err(SessionError::QuestionOutOfRange(index));
        }
        self.current = index;
        self.persist();
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), SessionError> {
        self.jump_to(self.current + 1)
    }

    pub fn previous(&mut self) -> Result<(), SessionError> {
        match self.current.checked_sub(1) {
            Some(index) => self.jump_to(index),
            None => Err(SessionError::QuestionOutOfRange(0)),
        }
    }

    /// Hidden tab or window blur. Latched: only the first loss submits.
    pub async fn focus_lost(&mut self) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Ok(());
        }
        match self.monitor.on_focus_lost() {
            Some(ev) => {
                self.notices.push(SessionNotice::Integrity(ev));
                self.submit_with(SubmitTrigger::FocusLost).await
            }
            None => Ok(()),
        }
    }

    pub async fn escape_pressed(&mut self) {
        if !self.state.is_active() {
            return;
        }
        if let Some(ev) = self.monitor.on_escape().await {
            self.notices.push(SessionNotice::Integrity(ev));
        }
    }

    pub async fn check_fullscreen(&mut self) {
        if !self.state.is_active() {
            return;
        }
        if let Some(ev) = self.monitor.check_fullscreen().await {
            tracing::warn!("Fullscreen left during test, restoring");
            self.notices.push(SessionNotice::Integrity(ev));
        }
    }

    pub async fn poll_faces(&mut self) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Ok(());
        }
        match self.monitor.poll_faces().await {
            Some(ev) if ev.is_fatal() => {
                self.notices.push(SessionNotice::Integrity(ev));
                self.submit_with(SubmitTrigger::FaceLimit).await
            }
            Some(ev) => {
                self.notices.push(SessionNotice::Integrity(ev));
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Returns `true` when the host should suppress the key press.
    pub fn on_key(&mut self, chord: &KeyChord) -> bool {
        if self.state.is_final() {
            return false;
        }
        match self.monitor.on_key(chord) {
            Some(ev) => {
                self.notices.push(SessionNotice::Integrity(ev));
                true
            }
            None => false,
        }
    }

    /// Returns `true` when the host should suppress the action.
    pub fn on_input(&mut self, action: InputAction) -> bool {
        if self.state.is_final() {
            return false;
        }
        match self.monitor.on_input(action) {
            Some(ev) => {
                self.notices.push(SessionNotice::Integrity(ev));
                true
            }
            None => false,
        }
    }

    /// The camera track ended mid-test. Shown to the user, never fatal.
    pub fn camera_lost(&mut self) {
        if !self.state.is_active() {
            return;
        }
        self.monitor.release_camera();
        if let Some(ev) = self.monitor.check_camera() {
            self.notices.push(SessionNotice::Integrity(ev));
        }
    }

    pub fn network_offline(&mut self) {
        self.online = false;
        if let SessionState::Active { paused: false } = self.state {
            self.countdown.pause();
            self.state = SessionState::Active { paused: true };
            tracing::info!(attempt_id = ?self.attempt_id, "Offline, timer paused");
            self.persist();
        }
    }

    pub fn network_online(&mut self) {
        self.online = true;
        if let SessionState::Active { paused: true } = self.state {
            self.countdown.resume();
            self.state = SessionState::Active { paused: false };
            tracing::info!(attempt_id = ?self.attempt_id, "Back online, timer resumed");
        }
    }

    pub async fn submit(&mut self) -> Result<(), SessionError> {
        self.submit_with(SubmitTrigger::Manual).await
    }

    /// Re-sends the frozen submission after a failed finalize.
    pub async fn retry_submit(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Submitting || self.pending.is_none() {
            return Err(SessionError::NothingToRetry);
        }
        self.finish_submission().await
    }

    /// Leaves the page: progress is saved, proctoring is torn down and the
    /// attempt stays open on the server for a later resume.
    pub fn leave(&mut self) {
        if self.state.is_final() {
            return;
        }
        self.persist();
        self.monitor.stop();
        tracing::info!(attempt_id = ?self.attempt_id, "Session abandoned");
        self.state = SessionState::Terminated(TerminalReason::Abandoned);
    }

    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_final()
    }

    pub fn test(&self) -> Option<&PublicTest> {
        self.test.as_ref()
    }

    pub fn attempt_id(&self) -> Option<i64> {
        self.attempt_id
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&PublicQuestion> {
        self.test.as_ref()?.questions.get(self.current)
    }

    pub fn answers(&self) -> &BTreeMap<i64, u8> {
        &self.answers
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.countdown.remaining()
    }

    pub fn restored_from_snapshot(&self) -> bool {
        self.restored
    }

    pub fn pending(&self) -> Option<&PendingSubmission> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn monitor(&self) -> &IntegrityMonitor {
        &self.monitor
    }

    async fn submit_with(&mut self, trigger: SubmitTrigger) -> Result<(), SessionError> {
        if self.submit_started {
            return Ok(());
        }
        if !self.state.is_active() {
            return Err(SessionError::NotActive);
        }
        let attempt_id = self.attempt_id.ok_or(SessionError::NotActive)?;

        self.submit_started = true;
        self.countdown.pause();
        self.pending = Some(PendingSubmission {
            request: SubmitTestRequest {
                attempt_id,
                answers: self.answers.clone(),
                time_taken_minutes: self.countdown.elapsed_minutes(),
            },
            trigger,
        });
        self.state = SessionState::Submitting;
        self.persist();
        tracing::info!(attempt_id, ?trigger, answered = self.answers.len(), "Submitting test");

        self.finish_submission().await
    }

    async fn finish_submission(&mut self) -> Result<(), SessionError> {
        let Some(pending) = self.pending.clone() else {
            return Err(SessionError::NothingToRetry);
        };

        match self.api.submit(&pending.request).await {
            Ok(result) => {
                self.finalized = true;
                self.monitor.stop();
                self.discard_snapshot();
                self.pending = None;
                self.last_error = None;
                tracing::info!(
                    attempt_id = result.attempt_id,
                    percentage = result.percentage,
                    already_completed = result.already_completed,
                    "Test submitted"
                );
                self.notices.push(SessionNotice::Completed(result.clone()));
                self.state = SessionState::Terminated(TerminalReason::Submitted(result));
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    attempt_id = pending.request.attempt_id,
                    error = %e,
                    "Failed to submit test"
                );
                // proctoring ends with the attempt; only the submission is retried
                self.monitor.stop();
                self.last_error = Some(e.to_string());
                self.notices.push(SessionNotice::SubmitFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    fn rehydrate(&mut self, test: &PublicTest, attempt_id: i64) {
        let snapshot = match self.snapshots.load(self.test_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(test_id = self.test_id, error = %e, "Unreadable progress snapshot");
                self.discard_snapshot();
                return;
            }
        };

        match snapshot {
            Some(snap) if snap.matches(self.test_id, attempt_id) => {
                let restored = snap.restore(test);
                self.current = restored.current_question;
                self.answers = restored.answers;
                if let Some(pending) = snap
                    .pending
                    .filter(|p| p.request.attempt_id == attempt_id)
                {
                    self.answers = pending.request.answers.clone();
                    self.pending = Some(pending);
                }
                self.countdown = Countdown::with_remaining(test.duration_seconds(), restored.time_left);
                self.restored = true;
            }
            Some(snap) => {
                tracing::info!(
                    test_id = self.test_id,
                    stale_attempt = snap.attempt_id,
                    attempt_id,
                    "Discarding stale progress snapshot"
                );
                self.discard_snapshot();
            }
            None => {}
        }
    }

    fn persist(&self) {
        if self.finalized {
            return;
        }
        let Some(attempt_id) = self.attempt_id else {
            return;
        };
        let snapshot = ProgressSnapshot {
            test_id: self.test_id,
            attempt_id,
            current_question: self.current,
            answers: self.answers.clone(),
            time_left: self.countdown.remaining(),
            ts: now(),
            pending: self.pending.clone(),
        };
        if let Err(e) = self.snapshots.save(&snapshot) {
            tracing::warn!(test_id = self.test_id, error = %e, "Failed to save progress");
        }
    }

    fn discard_snapshot(&self) {
        if let Err(e) = self.snapshots.remove(self.test_id) {
            tracing::warn!(test_id = self.test_id, error = %e, "Failed to clear progress");
        }
    }

    fn question_count(&self) -> usize {
        self.test.as_ref().map(|t| t.questions.len()).unwrap_or(0)
    }

    fn fail(&mut self, message: String, err: crate::error::Error) -> SessionError {
        tracing::error!(test_id = self.test_id, "{}", message);
        self.monitor.stop();
        self.last_error = Some(message.clone());
        self.state = SessionState::Error(message);
        err.into()
    }
}
