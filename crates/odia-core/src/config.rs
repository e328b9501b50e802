//! Pipeline and widget configuration.
//!
//! All timing values are stored as whole milliseconds so the structs
//! round-trip cleanly through JSON; use the `Duration` accessors in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::GenerationParams;

/// Voice used when the widget configuration does not name one.
pub const DEFAULT_VOICE: &str = "moss_audio_4e6eb029-ab89-11f0-a74c-2a7a0b4baedc";

/// System prompt sent ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant optimized for Nigerian \
English and Pidgin. Provide clear, concise responses with cultural awareness. Keep responses \
under 100 words for fast TTS conversion.";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the pipeline cannot run with.
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Reading the configuration file failed.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for this schema.
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ── Segmenter ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmenterConfig {
    /// Emit the whole buffer once it grows past this many characters.
    pub soft_limit: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self { soft_limit: 50 }
    }
}

// ── Synthesis ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisConfig {
    /// Concurrent synthesis requests per turn. `1` serializes them.
    pub max_in_flight: usize,
    pub request_timeout_ms: u64,
    pub speed: f32,
    pub pitch: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            request_timeout_ms: 15_000,
            speed: 1.0,
            pitch: 1.0,
        }
    }
}

impl SynthesisConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── Token stream ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    /// Ceiling for opening the request and receiving the first delta.
    pub first_token_timeout_ms: u64,
    /// Ceiling for the gap between two later deltas.
    pub idle_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            first_token_timeout_ms: 20_000,
            idle_timeout_ms: 15_000,
        }
    }
}

impl StreamConfig {
    pub const fn first_token_timeout(&self) -> Duration {
        Duration::from_millis(self.first_token_timeout_ms)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

// ── Voice activity ───────────────────────────────────────────────────

/// Energy-threshold voice activity detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VadConfig {
    /// Normalised RMS energy (0.0 - 1.0) above which a frame counts as speech.
    pub threshold: f32,
    /// Sustained activity needed before the user takes the floor.
    pub activation_ms: u64,
    /// Sustained silence after speech that ends a listening session.
    pub silence_timeout_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            activation_ms: 150,
            silence_timeout_ms: 1500,
        }
    }
}

impl VadConfig {
    pub const fn activation(&self) -> Duration {
        Duration::from_millis(self.activation_ms)
    }

    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

// ── Transcription ────────────────────────────────────────────────────

/// Voice input: how finished utterances are turned into user messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptionConfig {
    /// BCP-47 language hint passed to the recognizer.
    pub language: String,
    pub request_timeout_ms: u64,
    /// An utterance is cut off and transcribed once it reaches this length.
    pub max_utterance_ms: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: "en-NG".to_string(),
            request_timeout_ms: 20_000,
            max_utterance_ms: 15_000,
        }
    }
}

impl TranscriptionConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn max_utterance(&self) -> Duration {
        Duration::from_millis(self.max_utterance_ms)
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────

/// Everything the conversation orchestrator needs to run a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub system_prompt: String,
    /// Prior messages (not turns) carried into each request.
    pub history_limit: usize,
    pub generation: GenerationParams,
    pub segmenter: SegmenterConfig,
    pub synthesis: SynthesisConfig,
    pub stream: StreamConfig,
    pub vad: VadConfig,
    pub transcription: TranscriptionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: 10,
            generation: GenerationParams::default(),
            segmenter: SegmenterConfig::default(),
            synthesis: SynthesisConfig::default(),
            stream: StreamConfig::default(),
            vad: VadConfig::default(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segmenter.soft_limit == 0 {
            return Err(invalid("segmenter.softLimit", "must be greater than 0"));
        }
        if self.synthesis.max_in_flight == 0 {
            return Err(invalid("synthesis.maxInFlight", "must be at least 1"));
        }
        if self.synthesis.request_timeout_ms == 0 {
            return Err(invalid("synthesis.requestTimeoutMs", "must be greater than 0"));
        }
        if !(0.25..=4.0).contains(&self.synthesis.speed) {
            return Err(invalid("synthesis.speed", "must be between 0.25 and 4.0"));
        }
        if self.stream.first_token_timeout_ms == 0 || self.stream.idle_timeout_ms == 0 {
            return Err(invalid("stream", "timeouts must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(invalid("vad.threshold", "must be between 0.0 and 1.0"));
        }
        if self.transcription.request_timeout_ms == 0 || self.transcription.max_utterance_ms == 0 {
            return Err(invalid("transcription", "timeouts must be greater than 0"));
        }
        if self.generation.max_tokens == 0 {
            return Err(invalid("generation.maxTokens", "must be greater than 0"));
        }
        Ok(())
    }
}

// ── Widget ───────────────────────────────────────────────────────────

/// Settings the host page (or the proxy) hands to the widget.
///
/// The core treats `api_key` as opaque; it is forwarded to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub voice: String,
    pub auto_play_audio: bool,
    /// Whether the backend has speech synthesis credentials at all.
    pub synthesis_available: bool,
    /// Whether the backend can transcribe voice input.
    pub transcription_available: bool,
    pub theme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            auto_play_audio: true,
            synthesis_available: true,
            transcription_available: true,
            theme: "light".to_string(),
            api_key: None,
        }
    }
}

impl WidgetConfig {
    /// Whether replies should be spoken. When `false` the pipeline runs text-only.
    pub fn voice_enabled(&self) -> bool {
        self.auto_play_audio && self.synthesis_available && !self.voice.trim().is_empty()
    }
}
