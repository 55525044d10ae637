//! Integrity monitoring: focus loss, fullscreen enforcement, multi-face
//! strikes, input blocking and camera liveness.
//!
//! The monitor is advisory. It reports [`IntegrityEvent`]s and leaves the
//! decision to submit to the session controller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::capabilities::{
    Camera, Capabilities, CapabilityError, FaceDetector, Fullscreen, MediaStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedInput {
    Clipboard,
    DevTools,
    ContextMenu,
    Selection,
    DragDrop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityEvent {
    FocusLost,
    FullscreenRequired,
    MultipleFaces { strike: u32, max_strikes: u32 },
    FaceLimitReached { max_strikes: u32 },
    InputBlocked { input: BlockedInput },
    CameraOff,
}

impl IntegrityEvent {
    pub fn severity(&self) -> Severity {
        match self {
            IntegrityEvent::FocusLost | IntegrityEvent::FaceLimitReached { .. } => Severity::Fatal,
            _ => Severity::Warning,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// User-facing text for the alert shown by the host.
    pub fn message(&self) -> String {
        match self {
            IntegrityEvent::FocusLost => "Tab switching detected. Test will be submitted.".into(),
            IntegrityEvent::FullscreenRequired => {
                "Fullscreen is required during the test. Restoring fullscreen.".into()
            }
            IntegrityEvent::MultipleFaces {
                strike,
                max_strikes,
            } => format!(
                "Multiple faces detected. This is warning {}/{}. {} more and the test will be auto-submitted.",
                strike,
                max_strikes,
                max_strikes - strike
            ),
            IntegrityEvent::FaceLimitReached { max_strikes } => format!(
                "Multiple faces detected {} times. Submitting your test now.",
                max_strikes
            ),
            IntegrityEvent::InputBlocked { input } => match input {
                BlockedInput::Clipboard => "Copy/Paste is disabled during the test".into(),
                BlockedInput::DevTools => "Developer tools are disabled during the test".into(),
                BlockedInput::ContextMenu => "Right-click is disabled during the test".into(),
                BlockedInput::Selection => "Text selection is disabled during the test".into(),
                BlockedInput::DragDrop => "Drag and drop is disabled during the test".into(),
            },
            IntegrityEvent::CameraOff => {
                "Camera is off. Keep your camera on for the rest of the test.".into()
            }
        }
    }
}

/// Hidden-or-blur debouncing: the first loss wins, later ones are ignored.
#[derive(Debug, Default, Clone)]
pub struct FocusLatch {
    tripped: bool,
}

impl FocusLatch {
    /// Returns `true` only for the first call.
    pub fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.tripped, true)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceState {
    Clear,
    Warned(u32),
    Fatal,
}

/// Three-strikes policy for multi-face observations.
///
/// A strike is counted on the transition into a multi-face episode. The
/// episode ends when one or zero faces are seen again; the strike count does
/// not reset.
#[derive(Debug, Clone)]
pub struct FaceStrikes {
    max_strikes: u32,
    strikes: u32,
    in_episode: bool,
}

impl FaceStrikes {
    pub fn new(max_strikes: u32) -> Self {
        Self {
            max_strikes: max_strikes.max(1),
            strikes: 0,
            in_episode: false,
        }
    }

    pub fn observe(&mut self, face_count: usize) -> Option<IntegrityEvent> {
        if self.state() == FaceState::Fatal {
            return None;
        }
        if face_count <= 1 {
            self.in_episode = false;
            return None;
        }
        if self.in_episode {
            return None;
        }

        self.in_episode = true;
        self.strikes += 1;
        if self.strikes >= self.max_strikes {
            Some(IntegrityEvent::FaceLimitReached {
                max_strikes: self.max_strikes,
            })
        } else {
            Some(IntegrityEvent::MultipleFaces {
                strike: self.strikes,
                max_strikes: self.max_strikes,
            })
        }
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn state(&self) -> FaceState {
        match self.strikes {
            0 => FaceState::Clear,
            n if n >= self.max_strikes => FaceState::Fatal,
            n => FaceState::Warned(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyChord {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyChord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

/// Non-keyboard host interactions subject to blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    ContextMenu,
    SelectStart,
    DragStart,
    Drop,
}

pub fn classify_key(chord: &KeyChord) -> Option<BlockedInput> {
    let modifier = chord.ctrl || chord.meta;
    let key = chord.key.to_ascii_lowercase();

    if chord.key == "F12" {
        return Some(BlockedInput::DevTools);
    }
    if modifier && chord.shift && key == "i" {
        return Some(BlockedInput::DevTools);
    }
    if modifier && key == "u" {
        return Some(BlockedInput::DevTools);
    }
    if modifier && matches!(key.as_str(), "c" | "v" | "x" | "a") {
        return Some(BlockedInput::Clipboard);
    }
    None
}

pub fn classify_action(action: InputAction) -> BlockedInput {
    match action {
        InputAction::ContextMenu => BlockedInput::ContextMenu,
        InputAction::SelectStart => BlockedInput::Selection,
        InputAction::DragStart | InputAction::Drop => BlockedInput::DragDrop,
    }
}

/// Owns the camera stream while a session is running and turns raw host
/// signals into integrity events.
pub struct IntegrityMonitor {
    camera: Arc<dyn Camera>,
    face_detector: Option<Arc<dyn FaceDetector>>,
    fullscreen: Arc<dyn Fullscreen>,
    stream: Option<Box<dyn MediaStream>>,
    focus: FocusLatch,
    faces: FaceStrikes,
    camera_off_reported: bool,
    running: bool,
    stopped: bool,
}

impl IntegrityMonitor {
    pub fn new(capabilities: Capabilities, max_face_strikes: u32) -> Self {
        Self {
            camera: capabilities.camera,
            face_detector: capabilities.face_detector,
            fullscreen: capabilities.fullscreen,
            stream: None,
            focus: FocusLatch::default(),
            faces: FaceStrikes::new(max_face_strikes),
            camera_off_reported: false,
            running: false,
            stopped: false,
        }
    }

    /// Requests a fresh video stream, stopping any previous one first.
    pub async fn acquire_camera(&mut self) -> Result<(), CapabilityError> {
        self.release_camera();
        let stream = self.camera.request_video().await?;
        self.stream = Some(stream);
        self.camera_off_reported = false;
        Ok(())
    }

    pub fn has_camera(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    pub async fn enter_fullscreen(&self) -> Result<(), CapabilityError> {
        if self.fullscreen.is_active() {
            return Ok(());
        }
        self.fullscreen.request().await
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_active()
    }

    pub fn face_detection_enabled(&self) -> bool {
        self.face_detector.is_some()
    }

    pub fn start(&mut self) {
        if self.stopped {
            return;
        }
        self.running = true;
        if self.face_detector.is_none() {
            tracing::info!("Face detection unavailable, multi-face signal disabled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn face_strikes(&self) -> &FaceStrikes {
        &self.faces
    }

    pub fn on_focus_lost(&mut self) -> Option<IntegrityEvent> {
        if !self.running || !self.focus.trip() {
            return None;
        }
        tracing::warn!("Focus lost during test");
        Some(IntegrityEvent::FocusLost)
    }

    /// Periodic enforcement: re-requests fullscreen and warns when it was left.
    pub async fn check_fullscreen(&mut self) -> Option<IntegrityEvent> {
        if !self.running || self.fullscreen.is_active() {
            return None;
        }
        self.restore_fullscreen().await;
        Some(IntegrityEvent::FullscreenRequired)
    }

    pub async fn on_escape(&mut self) -> Option<IntegrityEvent> {
        if !self.running {
            return None;
        }
        self.restore_fullscreen().await;
        Some(IntegrityEvent::FullscreenRequired)
    }

    pub async fn poll_faces(&mut self) -> Option<IntegrityEvent> {
        if !self.running {
            return None;
        }
        let detector = self.face_detector.clone()?;
        let stream = self.stream.as_deref().filter(|s| s.is_live())?;

        match detector.count_faces(stream).await {
            Ok(count) => {
                let event = self.faces.observe(count);
                if let Some(ref ev) = event {
                    tracing::warn!(faces = count, strikes = self.faces.strikes(), "{}", ev.message());
                }
                event
            }
            Err(e) => {
                tracing::debug!(error = %e, "Face detection failed, skipping poll");
                None
            }
        }
    }

    /// Input blocking stays on until the monitor is stopped.
    pub fn on_key(&self, chord: &KeyChord) -> Option<IntegrityEvent> {
        if self.stopped {
            return None;
        }
        classify_key(chord).map(|input| IntegrityEvent::InputBlocked { input })
    }

    pub fn on_input(&self, action: InputAction) -> Option<IntegrityEvent> {
        if self.stopped {
            return None;
        }
        Some(IntegrityEvent::InputBlocked {
            input: classify_action(action),
        })
    }

    /// Reports a dead camera once per loss. Non-fatal.
    pub fn check_camera(&mut self) -> Option<IntegrityEvent> {
        if !self.running || self.has_camera() || self.camera_off_reported {
            return None;
        }
        self.camera_off_reported = true;
        tracing::warn!("Camera stream ended during test");
        Some(IntegrityEvent::CameraOff)
    }

    pub fn release_camera(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
        }
    }

    /// Stops every signal, releases the camera and leaves fullscreen.
    pub fn stop(&mut self) {
        self.running = false;
        self.stopped = true;
        self.release_camera();
        if self.fullscreen.is_active() {
            self.fullscreen.exit();
        }
    }

    async fn restore_fullscreen(&self) {
        if let Err(e) = self.fullscreen.request().await {
            tracing::warn!(error = %e, "Could not restore fullscreen");
        }
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.release_camera();
    }
}
