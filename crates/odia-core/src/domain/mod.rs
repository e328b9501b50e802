//! Domain types for the conversation pipeline.
//!
//! These are plain data: no I/O, no async. Pipeline stages in `odia-voice`
//! move them between each other by value.

mod audio;
mod chat;
mod chunk;
mod turn;

pub use audio::{MicFrame, Utterance, VoiceActivityState};
pub use chat::{ChatMessage, ChatRequest, GenerationParams, MessageRole};
pub use chunk::{AudioHandle, AudioUnit, BoundaryReason, TextChunk, estimate_speech_duration};
pub use turn::{Turn, TurnId, TurnStatus};
