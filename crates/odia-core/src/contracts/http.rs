//! HTTP routes and bodies.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, GenerationParams};

/// Streamed chat completion (SSE response).
pub const CHAT_STREAM_PATH: &str = "/v1/chat/stream";

/// Speech synthesis for one chunk.
pub const TTS_PATH: &str = "/v1/tts";

/// Speech recognition for one utterance. The body is a WAV file.
pub const STT_PATH: &str = "/v1/stt";

/// Public widget configuration.
pub const WIDGET_CONFIG_PATH: &str = "/api/widget-config";

/// Liveness check.
pub const HEALTH_PATH: &str = "/api/health";

/// SSE payload that ends a chat stream.
pub const SSE_DONE: &str = "[DONE]";

/// `POST /v1/chat/stream` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatStreamBody {
    pub fn new(messages: Vec<ChatMessage>, params: GenerationParams) -> Self {
        Self {
            messages,
            max_tokens: Some(params.max_tokens),
            temperature: Some(params.temperature),
        }
    }
}

/// `POST /v1/tts` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsBody {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
}

/// `POST /v1/tts` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponse {
    pub audio_url: String,
    pub duration_secs: f64,
    pub voice: String,
    pub latency_ms: u64,
}

/// `POST /v1/stt` query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// `POST /v1/stt` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SttResponse {
    pub text: String,
    pub latency_ms: u64,
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub version: String,
}

/// JSON error body returned by every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tts_body_accepts_text_only() {
        let body: TtsBody = serde_json::from_str(r#"{"text":"Hello."}"#).unwrap();
        assert_eq!(body.text, "Hello.");
        assert!(body.voice.is_none());
        assert!(body.speed.is_none());
    }

    #[test]
    fn test_chat_body_wire_shape() {
        let body = ChatStreamBody::new(vec![ChatMessage::user("hi")], GenerationParams::default());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["maxTokens"], 150);
        assert_eq!(json["messages"][0]["content"], "hi");
    }
}
