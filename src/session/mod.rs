//! Client-side core of a proctored test session: the state machine, its
//! integrity monitor, countdown, local progress snapshots and the backend
//! clients it talks to.

pub mod capabilities;
pub mod client;
pub mod controller;
pub mod driver;
pub mod integrity;
pub mod snapshot;
pub mod timer;

pub use capabilities::{Capabilities, CapabilityError};
pub use client::{AttemptApi, HttpAttemptClient, LocalAttemptApi};
pub use controller::{SessionController, SessionNotice, SessionState, TerminalReason};
pub use driver::{drive, HostEvent};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not in a state that accepts this action")]
    NotActive,

    #[error("Proctoring consent incomplete (camera: {camera}, fullscreen: {fullscreen})")]
    ConsentIncomplete { camera: bool, fullscreen: bool },

    #[error("Question {0} is not part of this test")]
    UnknownQuestion(i64),

    #[error("Option {option} is out of range for question {question_id}")]
    InvalidOption { question_id: i64, option: u8 },

    #[error("Question index {0} is out of range")]
    QuestionOutOfRange(usize),

    #[error("There is no failed submission to retry")]
    NothingToRetry,

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Api(#[from] crate::error::Error),
}
