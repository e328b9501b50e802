//! Proxy configuration.
//!
//! The binary fills this from flags and environment variables; the proxy
//! itself never reads the environment.

use std::net::SocketAddr;
use std::time::Duration;

use odia_core::{ConfigError, DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE, WidgetConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_CHAT_UPSTREAM: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TTS_MODEL: &str = "speech-02-hd";
pub const DEFAULT_STT_UPSTREAM: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3-turbo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    pub bind: SocketAddr,

    /// OpenAI-compatible chat completions endpoint.
    pub chat_upstream_url: String,
    pub chat_model: String,
    #[serde(skip_serializing)]
    pub chat_api_key: Option<String>,

    /// TTS endpoint. `None` disables `/v1/tts` (503).
    pub tts_upstream_url: Option<String>,
    pub tts_model: String,
    #[serde(skip_serializing)]
    pub tts_api_key: Option<String>,

    /// OpenAI-compatible audio transcription endpoint.
    pub stt_upstream_url: String,
    pub stt_model: String,
    /// Falls back to the chat key; `/v1/stt` answers 503 without either.
    #[serde(skip_serializing)]
    pub stt_api_key: Option<String>,

    pub default_voice: String,
    pub auto_play_audio: bool,
    pub theme: String,
    /// Public key the widget must present. Safe to hand to browsers.
    pub widget_api_key: Option<String>,
    /// Prepended to chat requests that carry no system message.
    pub system_prompt: String,

    pub connect_timeout_ms: u64,
    pub tts_timeout_ms: u64,
    pub stt_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            chat_upstream_url: DEFAULT_CHAT_UPSTREAM.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            chat_api_key: None,
            tts_upstream_url: None,
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            tts_api_key: None,
            stt_upstream_url: DEFAULT_STT_UPSTREAM.to_string(),
            stt_model: DEFAULT_STT_MODEL.to_string(),
            stt_api_key: None,
            default_voice: DEFAULT_VOICE.to_string(),
            auto_play_audio: true,
            theme: "light".to_string(),
            widget_api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            connect_timeout_ms: 10_000,
            tts_timeout_ms: 15_000,
            stt_timeout_ms: 20_000,
        }
    }
}

impl ProxyConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn tts_timeout(&self) -> Duration {
        Duration::from_millis(self.tts_timeout_ms)
    }

    pub const fn stt_timeout(&self) -> Duration {
        Duration::from_millis(self.stt_timeout_ms)
    }

    pub const fn synthesis_available(&self) -> bool {
        self.tts_upstream_url.is_some()
    }

    /// Key for the transcription upstream.
    pub fn stt_key(&self) -> Option<&str> {
        self.stt_api_key.as_deref().or(self.chat_api_key.as_deref())
    }

    pub fn transcription_available(&self) -> bool {
        self.stt_key().is_some()
    }

    /// What `GET /api/widget-config` returns. Never includes upstream keys.
    pub fn widget_config(&self) -> WidgetConfig {
        WidgetConfig {
            voice: self.default_voice.clone(),
            auto_play_audio: self.auto_play_audio,
            synthesis_available: self.synthesis_available(),
            transcription_available: self.transcription_available(),
            theme: self.theme.clone(),
            api_key: self.widget_api_key.clone(),
        }
    }

    /// Drop blank optional values (an empty env var means "unset").
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.chat_api_key,
            &mut self.tts_upstream_url,
            &mut self.tts_api_key,
            &mut self.stt_api_key,
            &mut self.widget_api_key,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("chatUpstreamUrl", &self.chat_upstream_url)?;
        check_url("sttUpstreamUrl", &self.stt_upstream_url)?;
        if let Some(url) = &self.tts_upstream_url {
            check_url("ttsUpstreamUrl", url)?;
        }
        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "chatModel",
                reason: "must not be empty".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 || self.tts_timeout_ms == 0 || self.stt_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("'{url}' is not an http(s) URL"),
        })
    }
}
