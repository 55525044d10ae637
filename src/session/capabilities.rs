//! Host capabilities the proctoring layer depends on: a camera, an optional
//! face detector and fullscreen control. Browsers, native shells and tests
//! provide their own implementations.

use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability failed: {0}")]
    Failed(String),
}

/// A live video-only stream.
pub trait MediaStream: Send + Sync {
    fn active_tracks(&self) -> usize;

    /// Stops every track. Safe to call more than once.
    fn stop_all(&self);

    fn is_live(&self) -> bool {
        self.active_tracks() > 0
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn request_video(&self) -> Result<Box<dyn MediaStream>, CapabilityError>;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn count_faces(&self, stream: &dyn MediaStream) -> Result<usize, CapabilityError>;
}

#[async_trait]
pub trait Fullscreen: Send + Sync {
    fn is_active(&self) -> bool;

    async fn request(&self) -> Result<(), CapabilityError>;

    fn exit(&self);
}

#[derive(Clone)]
pub struct Capabilities {
    pub camera: Arc<dyn Camera>,
    /// `None` when the host has no face detection; the signal is then off.
    pub face_detector: Option<Arc<dyn FaceDetector>>,
    pub fullscreen: Arc<dyn Fullscreen>,
}
