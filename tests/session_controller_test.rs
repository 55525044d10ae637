use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assessment_backend::config::ProctoringConfig;
use assessment_backend::dto::test_dto::{
    PublicTest, StartTestResponse, SubmitTestRequest, SubmitTestResponse,
};
use assessment_backend::error::{Error, Result};
use assessment_backend::models::question::Question;
use assessment_backend::models::test::TestDefinition;
use assessment_backend::session::capabilities::{
    Camera, Capabilities, CapabilityError, FaceDetector, Fullscreen, MediaStream,
};
use assessment_backend::session::controller::{SubmitTrigger, TerminalReason};
use assessment_backend::session::integrity::{IntegrityEvent, InputAction, KeyChord};
use assessment_backend::session::snapshot::{MemorySnapshotStore, ProgressSnapshot, SnapshotStore};
use assessment_backend::session::{
    drive, AttemptApi, HostEvent, LocalAttemptApi, SessionController, SessionError,
    SessionNotice, SessionState,
};
use assessment_backend::store::MemoryAttemptStore;
use assessment_backend::AppState;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

const USER: i64 = 5;
const QUICK_TEST: i64 = 50;

struct Tracks(Arc<AtomicUsize>);

impl MediaStream for Tracks {
    fn active_tracks(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn stop_all(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

struct FakeCamera {
    tracks: Arc<AtomicUsize>,
    denied: AtomicBool,
}

#[async_trait]
impl Camera for FakeCamera {
    async fn request_video(&self) -> std::result::Result<Box<dyn MediaStream>, CapabilityError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(CapabilityError::PermissionDenied("camera blocked".into()));
        }
        self.tracks.store(1, Ordering::SeqCst);
        Ok(Box::new(Tracks(self.tracks.clone())))
    }
}

#[derive(Default)]
struct FakeFullscreen {
    active: AtomicBool,
}

#[async_trait]
impl Fullscreen for FakeFullscreen {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn request(&self) -> std::result::Result<(), CapabilityError> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

struct ScriptedFaces(Mutex<Vec<usize>>);

#[async_trait]
impl FaceDetector for ScriptedFaces {
    async fn count_faces(
        &self,
        _stream: &dyn MediaStream,
    ) -> std::result::Result<usize, CapabilityError> {
        let mut script = self.0.lock().unwrap();
        Ok(if script.is_empty() { 1 } else { script.remove(0) })
    }
}

/// Local API that counts submissions and can be told to fail some of them.
struct CountingApi {
    inner: LocalAttemptApi,
    submits: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

#[async_trait]
impl AttemptApi for CountingApi {
    async fn fetch_test(&self, test_id: i64) -> Result<PublicTest> {
        self.inner.fetch_test(test_id).await
    }

    async fn start_or_resume(&self, test_id: i64) -> Result<StartTestResponse> {
        self.inner.start_or_resume(test_id).await
    }

    async fn submit(&self, request: &SubmitTestRequest) -> Result<SubmitTestResponse> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Internal("network unreachable".into()));
        }
        self.inner.submit(request).await
    }
}

type Controller = SessionController<CountingApi, Arc<MemorySnapshotStore>>;

struct Harness {
    state: AppState,
    snapshots: Arc<MemorySnapshotStore>,
    tracks: Arc<AtomicUsize>,
    camera: Arc<FakeCamera>,
    fullscreen: Arc<FakeFullscreen>,
    submits: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryAttemptStore::with_demo_catalogue());
        let (test, questions) = quick_test();
        store.insert_test(test, questions).unwrap();

        let tracks = Arc::new(AtomicUsize::new(0));
        Self {
            state: AppState::new(store, "memory"),
            snapshots: Arc::new(MemorySnapshotStore::new()),
            camera: Arc::new(FakeCamera {
                tracks: tracks.clone(),
                denied: AtomicBool::new(false),
            }),
            tracks,
            fullscreen: Arc::new(FakeFullscreen::default()),
            submits: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn controller(&self, test_id: i64, faces: Option<Vec<usize>>) -> Controller {
        let api = CountingApi {
            inner: LocalAttemptApi::new(
                self.state.test_service.clone(),
                self.state.attempt_service.clone(),
                USER,
            ),
            submits: self.submits.clone(),
            failures_left: self.failures_left.clone(),
        };
        let capabilities = Capabilities {
            camera: self.camera.clone(),
            face_detector: faces.map(|script| {
                Arc::new(ScriptedFaces(Mutex::new(script))) as Arc<dyn FaceDetector>
            }),
            fullscreen: self.fullscreen.clone(),
        };
        SessionController::new(
            test_id,
            api,
            self.snapshots.clone(),
            capabilities,
            &ProctoringConfig::default(),
        )
    }

    fn live_tracks(&self) -> usize {
        self.tracks.load(Ordering::SeqCst)
    }
}

/// One-minute test: q501 worth 20 (answer B), q502 worth 30 (answer A).
fn quick_test() -> (TestDefinition, Vec<Question>) {
    let question = |id: i64, correct: &str, points: i32| Question {
        id,
        test_id: QUICK_TEST,
        question_text: format!("Question {}", id),
        option_a: "alpha".into(),
        option_b: "beta".into(),
        option_c: "gamma".into(),
        option_d: "delta".into(),
        correct_answer: correct.into(),
        points,
        image_url: None,
    };
    let test = TestDefinition {
        id: QUICK_TEST,
        title: "Quick check".into(),
        subject: Some("General".into()),
        description: None,
        duration_minutes: 1,
        total_questions: 2,
        total_points: 50,
        difficulty: None,
        is_active: true,
        created_at: None,
    };
    (test, vec![question(501, "B", 20), question(502, "A", 30)])
}

async fn activate(controller: &mut Controller) {
    controller.load().await.unwrap();
    controller.grant_camera().await.unwrap();
    controller.enter_fullscreen().await.unwrap();
    controller.begin().unwrap();
}

fn submitted_percentage(controller: &Controller) -> Option<i32> {
    match controller.state() {
        SessionState::Terminated(TerminalReason::Submitted(result)) => Some(result.percentage),
        _ => None,
    }
}

#[tokio::test]
async fn timer_waits_for_camera_and_fullscreen() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();
    assert_eq!(*controller.state(), SessionState::AwaitingConsent);

    controller.tick().await.unwrap();
    assert_eq!(controller.remaining_seconds(), 60);

    let err = controller.begin().unwrap_err();
    assert!(matches!(
        err,
        SessionError::ConsentIncomplete {
            camera: false,
            fullscreen: false
        }
    ));

    controller.grant_camera().await.unwrap();
    assert!(matches!(
        controller.begin(),
        Err(SessionError::ConsentIncomplete {
            camera: true,
            fullscreen: false
        })
    ));

    controller.enter_fullscreen().await.unwrap();
    controller.begin().unwrap();
    assert_eq!(*controller.state(), SessionState::Active { paused: false });

    controller.tick().await.unwrap();
    assert_eq!(controller.remaining_seconds(), 59);
}

#[tokio::test]
async fn camera_denial_keeps_session_waiting() {
    let h = Harness::new();
    h.camera.denied.store(true, Ordering::SeqCst);
    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();

    let err = controller.grant_camera().await.unwrap_err();
    assert!(matches!(err, SessionError::Capability(CapabilityError::PermissionDenied(_))));
    assert_eq!(*controller.state(), SessionState::AwaitingConsent);
    assert!(matches!(
        controller.take_notices().as_slice(),
        [SessionNotice::CameraError(_)]
    ));

    h.camera.denied.store(false, Ordering::SeqCst);
    controller.grant_camera().await.unwrap();
    controller.enter_fullscreen().await.unwrap();
    controller.begin().unwrap();
    assert!(controller.state().is_active());
}

#[tokio::test]
async fn matching_snapshot_is_restored() {
    let h = Harness::new();
    let started = h
        .state
        .attempt_service
        .start_or_resume(USER, QUICK_TEST)
        .await
        .unwrap();
    h.snapshots
        .save(&ProgressSnapshot {
            test_id: QUICK_TEST,
            attempt_id: started.attempt.id,
            current_question: 1,
            answers: BTreeMap::from([(501, 1)]),
            time_left: 42,
            ts: Utc::now(),
            pending: None,
        })
        .unwrap();

    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();

    assert!(controller.restored_from_snapshot());
    assert_eq!(controller.attempt_id(), Some(started.attempt.id));
    assert_eq!(controller.current_index(), 1);
    assert_eq!(controller.answers(), &BTreeMap::from([(501, 1)]));
    assert_eq!(controller.remaining_seconds(), 42);
}

#[tokio::test]
async fn stale_snapshot_is_discarded() {
    let h = Harness::new();
    let started = h
        .state
        .attempt_service
        .start_or_resume(USER, QUICK_TEST)
        .await
        .unwrap();
    h.snapshots
        .save(&ProgressSnapshot {
            test_id: QUICK_TEST,
            attempt_id: started.attempt.id + 100,
            current_question: 1,
            answers: BTreeMap::from([(501, 1)]),
            time_left: 42,
            ts: Utc::now(),
            pending: None,
        })
        .unwrap();

    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();

    assert!(!controller.restored_from_snapshot());
    assert_eq!(controller.current_index(), 0);
    assert!(controller.answers().is_empty());
    assert_eq!(controller.remaining_seconds(), 60);
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_none());
}

#[tokio::test]
async fn answers_and_navigation_are_mirrored_to_snapshot() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;

    controller.select_answer(501, 1).unwrap();
    controller.next().unwrap();
    assert_eq!(controller.current_question().unwrap().id, 502);
    assert!(matches!(controller.next(), Err(SessionError::QuestionOutOfRange(2))));
    controller.previous().unwrap();
    controller.jump_to(1).unwrap();

    assert!(matches!(
        controller.select_answer(999, 0),
        Err(SessionError::UnknownQuestion(999))
    ));
    assert!(matches!(
        controller.select_answer(502, 4),
        Err(SessionError::InvalidOption { question_id: 502, option: 4 })
    ));

    let snap = h.snapshots.load(QUICK_TEST).unwrap().unwrap();
    assert_eq!(snap.current_question, 1);
    assert_eq!(snap.answers, BTreeMap::from([(501, 1)]));
    assert_eq!(Some(snap.attempt_id), controller.attempt_id());
}

#[tokio::test]
async fn timeout_and_focus_loss_finalize_once() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.select_answer(501, 1).unwrap();
    controller.select_answer(502, 2).unwrap();

    for _ in 0..60 {
        controller.tick().await.unwrap();
    }
    controller.focus_lost().await.unwrap();
    controller.submit().await.unwrap();

    assert_eq!(h.submits.load(Ordering::SeqCst), 1);
    assert_eq!(submitted_percentage(&controller), Some(40));
    assert_eq!(controller.remaining_seconds(), 0);
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_none());
    assert_eq!(h.live_tracks(), 0);
}

#[tokio::test]
async fn focus_loss_submits_immediately() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;

    controller.focus_lost().await.unwrap();
    controller.focus_lost().await.unwrap();

    assert_eq!(h.submits.load(Ordering::SeqCst), 1);
    assert_eq!(submitted_percentage(&controller), Some(0));
    assert_eq!(h.live_tracks(), 0);
    let notices = controller.take_notices();
    assert!(notices.contains(&SessionNotice::Integrity(IntegrityEvent::FocusLost)));
}

#[tokio::test]
async fn third_face_strike_auto_submits() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, Some(vec![2, 1, 3, 0, 2]));
    activate(&mut controller).await;

    for _ in 0..4 {
        controller.poll_faces().await.unwrap();
        assert!(controller.state().is_active());
    }
    controller.poll_faces().await.unwrap();

    assert!(submitted_percentage(&controller).is_some());
    assert_eq!(h.live_tracks(), 0);
    assert!(!h.fullscreen.is_active());
    let strikes: Vec<IntegrityEvent> = controller
        .take_notices()
        .into_iter()
        .filter_map(|n| match n {
            SessionNotice::Integrity(ev) => Some(ev),
            _ => None,
        })
        .collect();
    assert_eq!(
        strikes,
        vec![
            IntegrityEvent::MultipleFaces {
                strike: 1,
                max_strikes: 3
            },
            IntegrityEvent::MultipleFaces {
                strike: 2,
                max_strikes: 3
            },
            IntegrityEvent::FaceLimitReached { max_strikes: 3 },
        ]
    );
}

#[tokio::test]
async fn offline_pauses_timer_and_saves_progress() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.tick().await.unwrap();

    controller.network_offline();
    assert_eq!(*controller.state(), SessionState::Active { paused: true });
    controller.tick().await.unwrap();
    assert_eq!(controller.remaining_seconds(), 59);
    assert_eq!(h.snapshots.load(QUICK_TEST).unwrap().unwrap().time_left, 59);

    // answering still works while offline
    controller.select_answer(502, 0).unwrap();

    controller.network_online();
    controller.tick().await.unwrap();
    assert_eq!(controller.remaining_seconds(), 58);
}

#[tokio::test]
async fn failed_submit_keeps_progress_and_can_be_retried() {
    let h = Harness::new();
    h.failures_left.store(1, Ordering::SeqCst);
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.select_answer(501, 1).unwrap();

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Api(Error::Internal(_))));
    assert_eq!(*controller.state(), SessionState::Submitting);
    assert!(controller.last_error().is_some());
    assert_eq!(controller.pending().unwrap().trigger, SubmitTrigger::Manual);
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_some());
    assert_eq!(h.live_tracks(), 0);

    // nothing sends the session back to active
    controller.focus_lost().await.unwrap();
    controller.tick().await.unwrap();
    assert!(controller.select_answer(502, 0).is_err());
    assert_eq!(*controller.state(), SessionState::Submitting);

    controller.retry_submit().await.unwrap();
    assert_eq!(h.submits.load(Ordering::SeqCst), 2);
    assert_eq!(submitted_percentage(&controller), Some(40));
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_none());
    assert!(matches!(
        controller.retry_submit().await,
        Err(SessionError::NothingToRetry)
    ));
}

#[tokio::test]
async fn reload_after_failed_fatal_submit_stays_submitting() {
    let h = Harness::new();
    h.failures_left.store(1, Ordering::SeqCst);
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.select_answer(501, 1).unwrap();

    assert!(controller.focus_lost().await.is_err());
    assert_eq!(*controller.state(), SessionState::Submitting);
    controller.leave();

    let snap = h.snapshots.load(QUICK_TEST).unwrap().unwrap();
    let saved = snap.pending.expect("frozen submission is saved");
    assert_eq!(saved.trigger, SubmitTrigger::FocusLost);
    assert_eq!(saved.request.answers, BTreeMap::from([(501, 1)]));

    let mut again = h.controller(QUICK_TEST, None);
    again.load().await.unwrap();
    assert_eq!(*again.state(), SessionState::Submitting);
    assert_eq!(again.pending(), Some(&saved));
    assert_eq!(again.answers(), &BTreeMap::from([(501, 1)]));

    // the test never reopens
    assert!(matches!(again.grant_camera().await, Err(SessionError::NotActive)));
    assert!(matches!(again.begin(), Err(SessionError::NotActive)));
    assert!(again.select_answer(502, 0).is_err());
    again.tick().await.unwrap();
    assert_eq!(*again.state(), SessionState::Submitting);
    assert_eq!(h.live_tracks(), 0);

    again.retry_submit().await.unwrap();
    assert_eq!(h.submits.load(Ordering::SeqCst), 2);
    assert_eq!(submitted_percentage(&again), Some(40));
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_none());
}

#[tokio::test]
async fn escape_restores_fullscreen_without_submitting() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.take_notices();

    h.fullscreen.exit();
    controller.escape_pressed().await;

    assert_eq!(
        controller.take_notices(),
        vec![SessionNotice::Integrity(IntegrityEvent::FullscreenRequired)]
    );
    assert!(h.fullscreen.is_active());
    assert_eq!(*controller.state(), SessionState::Active { paused: false });
    assert_eq!(h.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn leaving_persists_progress_and_releases_camera() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.select_answer(502, 0).unwrap();
    assert_eq!(h.live_tracks(), 1);

    controller.leave();

    assert_eq!(
        *controller.state(),
        SessionState::Terminated(TerminalReason::Abandoned)
    );
    assert_eq!(h.live_tracks(), 0);
    assert!(!h.fullscreen.is_active());
    let snap = h.snapshots.load(QUICK_TEST).unwrap().unwrap();
    assert_eq!(snap.answers, BTreeMap::from([(502, 0)]));
    assert_eq!(h.submits.load(Ordering::SeqCst), 0);

    // reload resumes the same attempt with the saved answers
    let mut again = h.controller(QUICK_TEST, None);
    again.load().await.unwrap();
    assert!(again.restored_from_snapshot());
    assert_eq!(again.answers(), &BTreeMap::from([(502, 0)]));
}

#[tokio::test]
async fn completed_attempt_ends_session_without_proctoring() {
    let h = Harness::new();
    let started = h
        .state
        .attempt_service
        .start_or_resume(USER, QUICK_TEST)
        .await
        .unwrap();
    h.state
        .attempt_service
        .finalize(started.attempt.id, USER, 20, 1)
        .await
        .unwrap();
    h.snapshots
        .save(&ProgressSnapshot {
            test_id: QUICK_TEST,
            attempt_id: started.attempt.id,
            current_question: 0,
            answers: BTreeMap::new(),
            time_left: 10,
            ts: Utc::now(),
            pending: None,
        })
        .unwrap();

    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();

    assert_eq!(
        *controller.state(),
        SessionState::Terminated(TerminalReason::AlreadyCompleted)
    );
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_none());
    assert_eq!(h.live_tracks(), 0);
    assert!(matches!(
        controller.grant_camera().await,
        Err(SessionError::NotActive)
    ));
}

#[tokio::test]
async fn missing_test_is_a_load_error() {
    let h = Harness::new();
    let mut controller = h.controller(404, None);

    let err = controller.load().await.unwrap_err();
    assert!(matches!(err, SessionError::Api(Error::NotFound(_))));
    assert!(matches!(controller.state(), SessionState::Error(_)));
    assert!(controller.is_finished());
}

#[tokio::test]
async fn shortcuts_are_blocked_until_the_session_ends() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    controller.load().await.unwrap();

    assert!(controller.on_key(&KeyChord::new("c").ctrl()));
    assert!(controller.on_input(InputAction::ContextMenu));
    assert!(!controller.on_key(&KeyChord::new("b")));

    controller.leave();
    assert!(!controller.on_key(&KeyChord::new("c").ctrl()));
}

#[tokio::test]
async fn camera_loss_warns_without_submitting() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    activate(&mut controller).await;
    controller.take_notices();

    controller.camera_lost();
    assert!(controller.state().is_active());
    assert_eq!(
        controller.take_notices(),
        vec![SessionNotice::Integrity(IntegrityEvent::CameraOff)]
    );
    assert_eq!(h.live_tracks(), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_auto_submits_when_time_runs_out() {
    let h = Harness::new();
    let controller = h.controller(QUICK_TEST, None);
    let (tx, rx) = mpsc::channel(16);
    for event in [
        HostEvent::GrantCamera,
        HostEvent::EnterFullscreen,
        HostEvent::Begin,
        HostEvent::Answer {
            question_id: 501,
            option: 1,
        },
        HostEvent::Answer {
            question_id: 502,
            option: 2,
        },
        HostEvent::Key(KeyChord::new("F12")),
    ] {
        tx.send(event).await.unwrap();
    }

    let handle = tokio::spawn(async move {
        let mut controller = controller;
        let result = drive(&mut controller, &ProctoringConfig::default(), rx).await;
        (controller, result)
    });
    let (controller, result) = handle.await.unwrap();
    drop(tx);

    result.unwrap();
    assert_eq!(submitted_percentage(&controller), Some(40));
    assert_eq!(controller.remaining_seconds(), 0);
    assert_eq!(h.submits.load(Ordering::SeqCst), 1);
    assert_eq!(h.live_tracks(), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_treats_closed_channel_as_leaving() {
    let h = Harness::new();
    let mut controller = h.controller(QUICK_TEST, None);
    let (tx, rx) = mpsc::channel(4);
    tx.send(HostEvent::GrantCamera).await.unwrap();
    tx.send(HostEvent::EnterFullscreen).await.unwrap();
    tx.send(HostEvent::Begin).await.unwrap();
    drop(tx);

    drive(&mut controller, &ProctoringConfig::default(), rx)
        .await
        .unwrap();

    assert_eq!(
        *controller.state(),
        SessionState::Terminated(TerminalReason::Abandoned)
    );
    assert_eq!(h.live_tracks(), 0);
    assert!(h.snapshots.load(QUICK_TEST).unwrap().is_some());
    assert_eq!(h.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn driver_starts_the_clock_at_consent() {
    let h = Harness::new();
    let controller = h.controller(QUICK_TEST, None);
    let (tx, rx) = mpsc::channel(8);

    let handle = tokio::spawn(async move {
        let mut controller = controller;
        let result = drive(&mut controller, &ProctoringConfig::default(), rx).await;
        (controller, result)
    });

    tokio::time::sleep(Duration::from_millis(900)).await;
    for event in [HostEvent::GrantCamera, HostEvent::EnterFullscreen, HostEvent::Begin] {
        tx.send(event).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let snap = h.snapshots.load(QUICK_TEST).unwrap().unwrap();
    assert_eq!(snap.time_left, 60);

    tokio::time::sleep(Duration::from_millis(900)).await;
    let snap = h.snapshots.load(QUICK_TEST).unwrap().unwrap();
    assert_eq!(snap.time_left, 59);

    drop(tx);
    let (controller, result) = handle.await.unwrap();
    result.unwrap();
    assert_eq!(
        *controller.state(),
        SessionState::Terminated(TerminalReason::Abandoned)
    );
}

#[tokio::test(start_paused = true)]
async fn driver_resends_a_restored_submission() {
    let h = Harness::new();
    h.failures_left.store(1, Ordering::SeqCst);
    let mut first = h.controller(QUICK_TEST, None);
    activate(&mut first).await;
    first.select_answer(502, 0).unwrap();
    assert!(first.submit().await.is_err());
    first.leave();

    let mut again = h.controller(QUICK_TEST, None);
    let (_tx, rx) = mpsc::channel(1);
    drive(&mut again, &ProctoringConfig::default(), rx)
        .await
        .unwrap();

    assert_eq!(submitted_percentage(&again), Some(60));
    assert_eq!(h.submits.load(Ordering::SeqCst), 2);
}
