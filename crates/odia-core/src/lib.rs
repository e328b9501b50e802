#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod cancel;
pub mod config;
pub mod contracts;
pub mod domain;
pub mod events;
pub mod ports;

// Re-export commonly used types for convenience
pub use cancel::{CancelReason, TurnToken};
pub use config::{
    ConfigError, DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE, PipelineConfig, SegmenterConfig,
    StreamConfig, SynthesisConfig, TranscriptionConfig, VadConfig, WidgetConfig,
};
pub use domain::{
    AudioHandle, AudioUnit, BoundaryReason, ChatMessage, ChatRequest, GenerationParams, MessageRole,
    MicFrame, TextChunk, Turn, TurnId, TurnStatus, Utterance, VoiceActivityState,
    estimate_speech_duration,
};
pub use events::{ConversationEvent, WidgetStatus};
pub use ports::{
    AudioOutputPort, ChatStreamPort, DeltaStream, MicStream, MicrophoneError, MicrophonePort,
    NoopTranscriptSink, PlaybackError, SpeechSynthesisPort, SpeechToTextPort, SynthesisError,
    SynthesisRequest, SynthesizedAudio, TracingTranscriptSink, TranscriptSink, TranscriptionError,
    TransportError,
};
