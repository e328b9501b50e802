use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Utterance;

/// Failures of a single transcription request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    /// No recognizer or credentials are configured.
    #[error("Speech recognition unavailable: {0}")]
    Unavailable(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transcription endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),

    #[error("Transcription timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns a finished utterance into text.
#[async_trait]
pub trait SpeechToTextPort: Send + Sync {
    /// Transcribe one utterance. An empty string means nothing intelligible
    /// was said. Dropping the future must abort the request.
    async fn transcribe(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<String, TranscriptionError>;
}
