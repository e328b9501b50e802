use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AudioHandle;

/// One synthesis request: the text of a single chunk plus voice settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub pitch: f32,
}

/// What a synthesizer hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub handle: AudioHandle,
    /// Provider-reported duration. `None` falls back to a length estimate.
    pub duration: Option<Duration>,
}

/// Failures of a single synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// No synthesis backend or credentials are configured.
    #[error("Speech synthesis unavailable: {0}")]
    Unavailable(String),

    /// Could not reach the endpoint.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Synthesis endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response did not contain playable audio.
    #[error("Invalid synthesis response: {0}")]
    InvalidResponse(String),

    /// No response within the per-request ceiling.
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns text into playable audio.
#[async_trait]
pub trait SpeechSynthesisPort: Send + Sync {
    /// Synthesize one chunk. Dropping the future must abort the request.
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, SynthesisError>;
}
