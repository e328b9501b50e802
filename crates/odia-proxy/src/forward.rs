//! Upstream calls: chat completion streaming, speech synthesis and
//! transcription.
//!
//! The chat response is streamed straight through to the client so the
//! first tokens arrive as soon as the upstream produces them. Dropping the
//! response body (client disconnect) drops the upstream request.

use std::time::Instant;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::TryStreamExt;
use odia_core::contracts::http::{ChatStreamBody, SttQuery, SttResponse, TtsBody, TtsResponse};
use odia_core::{ChatMessage, MessageRole, estimate_speech_duration};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::ProxyConfig;
use crate::error::ProxyError;

/// Body sent to the OpenAI-compatible upstream.
#[derive(Debug, Serialize)]
struct UpstreamChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Body sent to the TTS upstream.
#[derive(Debug, Serialize)]
struct UpstreamTtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
    speed: f32,
    pitch: f32,
    model: &'a str,
}

/// What we read back from the TTS upstream. Providers disagree on the field
/// name for the audio location.
#[derive(Debug, Default, Deserialize)]
struct UpstreamTtsResponse {
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// What we read back from the transcription upstream.
#[derive(Debug, Deserialize)]
struct UpstreamSttResponse {
    text: String,
}

/// Longest clip duration we believe from the upstream. Anything above is
/// treated as missing.
const MAX_CHUNK_DURATION_SECS: f64 = 600.0;

/// The upstream's reported duration when it is a plausible clip length.
fn reported_duration(duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| d.is_finite() && *d > 0.0 && *d <= MAX_CHUNK_DURATION_SECS)
}

/// Prepend the configured system prompt unless the client sent its own.
fn with_system_prompt(system_prompt: &str, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let has_system = messages.iter().any(|m| m.role == MessageRole::System);
    if has_system || system_prompt.trim().is_empty() {
        return messages;
    }
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage::system(system_prompt));
    out.extend(messages);
    out
}

/// Forward a chat request upstream with `stream: true` and pass the SSE body through.
pub async fn forward_chat_stream(
    client: &Client,
    config: &ProxyConfig,
    body: ChatStreamBody,
) -> Result<Response, ProxyError> {
    if body.messages.is_empty() {
        return Err(ProxyError::BadRequest("messages must not be empty".to_string()));
    }

    let request = UpstreamChatRequest {
        model: &config.chat_model,
        messages: with_system_prompt(&config.system_prompt, body.messages),
        stream: true,
        max_tokens: body.max_tokens,
        temperature: body.temperature,
    };
    debug!(
        upstream = %config.chat_upstream_url,
        model = %config.chat_model,
        messages = request.messages.len(),
        "Forwarding chat stream"
    );

    let mut builder = client.post(&config.chat_upstream_url).json(&request);
    if let Some(key) = &config.chat_api_key {
        builder = builder.bearer_auth(key);
    }

    let response = builder.send().await.map_err(|e| {
        error!("Failed to connect to chat upstream: {e}");
        ProxyError::ChatFailed {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProxyError::ChatFailed {
            status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        });
    }

    Ok(streaming_response(response))
}

/// Wrap the upstream byte stream as an SSE response.
fn streaming_response(response: reqwest::Response) -> Response {
    let body = Body::from_stream(response.bytes_stream().map_err(std::io::Error::other));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("x-accel-buffering", "no") // Disable nginx buffering
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Synthesize one chunk through the TTS upstream.
pub async fn synthesize(
    client: &Client,
    config: &ProxyConfig,
    body: TtsBody,
) -> Result<TtsResponse, ProxyError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(ProxyError::BadRequest("text is required".to_string()));
    }
    let Some(url) = &config.tts_upstream_url else {
        return Err(ProxyError::ServiceUnavailable(
            "speech synthesis is not configured".to_string(),
        ));
    };

    let voice = body
        .voice
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.default_voice.clone());
    let request = UpstreamTtsRequest {
        text,
        voice: &voice,
        speed: body.speed.unwrap_or(1.0),
        pitch: body.pitch.unwrap_or(1.0),
        model: &config.tts_model,
    };

    let started = Instant::now();
    let mut builder = client
        .post(url)
        .timeout(config.tts_timeout())
        .json(&request);
    if let Some(key) = &config.tts_api_key {
        builder = builder.bearer_auth(key);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| ProxyError::TtsFailed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ProxyError::TtsFailed(format!("upstream returned {status}: {detail}")));
    }

    let payload: UpstreamTtsResponse = response
        .json()
        .await
        .map_err(|e| ProxyError::TtsFailed(format!("invalid upstream response: {e}")))?;
    let audio_url = payload
        .audio_url
        .or(payload.url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ProxyError::TtsFailed("upstream returned no audio URL".to_string()))?;

    let duration_secs = reported_duration(payload.duration)
        .unwrap_or_else(|| estimate_speech_duration(text).as_secs_f64());
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(chars = text.len(), %voice, latency_ms, "Synthesized chunk");
    Ok(TtsResponse {
        audio_url,
        duration_secs,
        voice,
        latency_ms,
    })
}

/// Whisper-style upstreams take the ISO-639-1 part of a BCP-47 tag.
fn upstream_language(language: &str) -> Option<&str> {
    language
        .split(['-', '_'])
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

/// Transcribe one WAV upload through the OpenAI-compatible upstream.
pub async fn transcribe(
    client: &Client,
    config: &ProxyConfig,
    audio: Bytes,
    query: SttQuery,
) -> Result<SttResponse, ProxyError> {
    if audio.is_empty() {
        return Err(ProxyError::BadRequest("audio is required".to_string()));
    }
    let Some(key) = config.stt_key() else {
        return Err(ProxyError::ServiceUnavailable(
            "speech recognition is not configured".to_string(),
        ));
    };

    let bytes = audio.len();
    let file = Part::bytes(audio.to_vec())
        .file_name("utterance.wav")
        .mime_str("audio/wav")
        .map_err(|e| ProxyError::SttFailed(e.to_string()))?;
    let mut form = Form::new()
        .part("file", file)
        .text("model", config.stt_model.clone())
        .text("response_format", "json");
    if let Some(language) = query.language.as_deref().and_then(upstream_language) {
        form = form.text("language", language.to_string());
    }

    let started = Instant::now();
    let response = client
        .post(&config.stt_upstream_url)
        .timeout(config.stt_timeout())
        .bearer_auth(key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| ProxyError::SttFailed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ProxyError::SttFailed(format!("upstream returned {status}: {detail}")));
    }

    let payload: UpstreamSttResponse = response
        .json()
        .await
        .map_err(|e| ProxyError::SttFailed(format!("invalid upstream response: {e}")))?;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(bytes, latency_ms, "Transcribed utterance");
    Ok(SttResponse {
        text: payload.text.trim().to_string(),
        latency_ms,
    })
}
