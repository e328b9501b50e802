//! Ports: the traits pipeline stages use to reach the outside world.
//!
//! Every I/O boundary of the conversation pipeline is a trait here so that
//! `odia-voice` can be driven by HTTP transports, audio devices, or the
//! scripted fakes in its tests without changing a line of pipeline code.
//!
//! # Cancellation contract
//!
//! Ports do not receive the turn token. Callers cancel by *dropping* the
//! future or stream they got back, so implementations must release the
//! underlying request or device handle on drop.

mod audio_output;
mod chat_stream;
mod microphone;
mod speech_to_text;
mod synthesis;
mod transcript;

pub use audio_output::{AudioOutputPort, PlaybackError};
pub use chat_stream::{ChatStreamPort, DeltaStream, TransportError};
pub use microphone::{MicStream, MicrophoneError, MicrophonePort};
pub use speech_to_text::{SpeechToTextPort, TranscriptionError};
pub use synthesis::{SpeechSynthesisPort, SynthesisError, SynthesisRequest, SynthesizedAudio};
pub use transcript::{NoopTranscriptSink, TracingTranscriptSink, TranscriptSink};
