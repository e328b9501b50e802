//! Voice pipeline error types.

use odia_core::{MicrophoneError, PlaybackError, TransportError};

/// Errors surfaced through the orchestrator handle and the transports.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Submitted text was empty after trimming.
    #[error("Cannot submit an empty message")]
    EmptyInput,

    /// The orchestrator task has stopped and no longer accepts commands.
    #[error("Conversation orchestrator is not running")]
    OrchestratorStopped,

    /// A listening session is already open.
    #[error("Already listening")]
    AlreadyListening,

    /// No microphone was wired into the orchestrator.
    #[error("No microphone configured")]
    NoMicrophone,

    /// Opening the microphone failed.
    #[error(transparent)]
    Microphone(#[from] MicrophoneError),

    /// The chat transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The audio output failed.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Building an HTTP client failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// An endpoint URL could not be parsed or joined.
    #[error("Invalid endpoint URL '{0}'")]
    InvalidEndpoint(String),
}
