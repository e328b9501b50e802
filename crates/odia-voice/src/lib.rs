#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

// Dev-dependencies used only by the integration tests
#[cfg(test)]
use axum as _;
#[cfg(test)]
use tokio_test as _;

pub mod error;
pub mod interruption;
pub mod orchestrator;
pub mod playback;
pub mod segmenter;
pub mod speakable;
pub mod synthesis;
pub mod token_stream;
pub mod transport;

#[cfg(feature = "device")]
pub mod device;

// Re-export key types for convenience
pub use error::VoiceError;
pub use interruption::{InterruptionController, InterruptionEvent, InterruptionState};
pub use orchestrator::{
    ConversationOrchestrator, OrchestratorDeps, OrchestratorHandle, TRANSCRIPTION_ERROR_MESSAGE,
    TURN_ERROR_MESSAGE, TeardownReport, TurnPhase,
};
pub use playback::{PlaybackEvent, PlaybackQueue};
pub use segmenter::SentenceSegmenter;
pub use speakable::speakable_text;
pub use synthesis::{SkipReason, SynthesisOutput, SynthesisQueue};
pub use token_stream::{ReadOutcome, TokenStreamReader};
pub use transport::{HttpChatStream, HttpSynthesizer, HttpTranscriber, ProxyEndpoint};

#[cfg(feature = "device")]
pub use device::{DeviceAudioOutput, DeviceMicrophone};
