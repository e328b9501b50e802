//! HTTP transports against an in-process mock proxy.
//!
//! A small axum router stands in for `odia-proxy` on an ephemeral port so
//! the real `reqwest` client path is exercised end to end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use odia_core::contracts::http::{ChatStreamBody, SttQuery, TtsBody};
use odia_core::{
    AudioHandle, ChatMessage, ChatRequest, ChatStreamPort, GenerationParams, SpeechSynthesisPort,
    SpeechToTextPort, SynthesisError, SynthesisRequest, TranscriptionError, TransportError,
    Utterance,
};
use odia_voice::{HttpChatStream, HttpSynthesizer, HttpTranscriber, ProxyEndpoint};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

#[derive(Clone, Default)]
struct MockState {
    chat_calls: Arc<AtomicUsize>,
}

fn sse(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": part}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn chat_stream(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<ChatStreamBody>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer widget-key") {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }
    let last = body
        .messages
        .last()
        .map(|m| m.content.clone())
        .unwrap_or_default();
    if last == "boom" {
        return (StatusCode::BAD_GATEWAY, "upstream down").into_response();
    }
    if last == "truncated" {
        return ([(header::CONTENT_TYPE, "text/event-stream")], "data: {\"choices\":[{\"delta\":{\"content\":\"half\"}}]}\n\n").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        sse(&["Hello", " from", " the proxy."]),
    )
        .into_response()
}

async fn tts(Json(body): Json<TtsBody>) -> Response {
    match body.text.as_str() {
        "unavailable" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "TTS not configured", "status": 503})),
        )
            .into_response(),
        "broken" => Json(json!({"audioUrl": "", "durationSecs": 0.0, "voice": "v", "latencyMs": 1}))
            .into_response(),
        "endless" => Json(json!({
            "audioUrl": "https://cdn.test/e.mp3",
            "durationSecs": 1e30,
            "voice": "v",
            "latencyMs": 1
        }))
        .into_response(),
        _ => Json(json!({
            "audioUrl": "https://cdn.test/a.mp3",
            "durationSecs": 1.5,
            "voice": body.voice.unwrap_or_default(),
            "latencyMs": 42
        }))
        .into_response(),
    }
}

/// Echoes what it received so the test can check the upload.
async fn stt(Query(query): Query<SttQuery>, headers: HeaderMap, body: Bytes) -> Response {
    let language = query.language.unwrap_or_default();
    if language == "none" {
        return (StatusCode::SERVICE_UNAVAILABLE, "STT not configured").into_response();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type != "audio/wav" || !body.starts_with(b"RIFF") {
        return (StatusCode::BAD_REQUEST, "expected a WAV upload").into_response();
    }
    Json(json!({
        "text": format!("  {} bytes in {language}  ", body.len()),
        "latencyMs": 3
    }))
    .into_response()
}

async fn widget_config() -> Json<serde_json::Value> {
    Json(json!({"voice": "naija_female", "autoPlayAudio": false, "theme": "dark", "synthesisAvailable": true}))
}

async fn spawn_mock() -> (SocketAddr, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/v1/chat/stream", post(chat_stream))
        .route("/v1/tts", post(tts))
        .route("/v1/stt", post(stt))
        .route("/api/widget-config", get(widget_config))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn endpoint(addr: SocketAddr) -> ProxyEndpoint {
    ProxyEndpoint::new(format!("http://{addr}"), Some("widget-key".to_string())).unwrap()
}

fn request(text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user(text)],
        params: GenerationParams::default(),
    }
}

fn synthesis(text: &str) -> SynthesisRequest {
    SynthesisRequest {
        text: text.to_string(),
        voice: "naija_female".to_string(),
        speed: 1.0,
        pitch: 1.0,
    }
}

#[tokio::test]
async fn test_chat_stream_yields_deltas() {
    let (addr, state) = spawn_mock().await;
    let chat = HttpChatStream::new(endpoint(addr));

    let deltas: Vec<_> = assert_ok!(chat.open(&request("hi")).await).collect().await;
    assert_eq!(
        deltas,
        vec![
            Ok("Hello".to_string()),
            Ok(" from".to_string()),
            Ok(" the proxy.".to_string())
        ]
    );
    assert_eq!(state.chat_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_chat_stream_status_error() {
    let (addr, _) = spawn_mock().await;
    let chat = HttpChatStream::new(endpoint(addr));

    let err = chat.open(&request("boom")).await.err().unwrap();
    assert!(matches!(err, TransportError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_chat_stream_requires_key() {
    let (addr, _) = spawn_mock().await;
    let chat = HttpChatStream::new(endpoint(addr).with_api_key(None));

    let err = chat.open(&request("hi")).await.err().unwrap();
    assert!(matches!(err, TransportError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_chat_stream_without_done_is_protocol_error() {
    let (addr, _) = spawn_mock().await;
    let chat = HttpChatStream::new(endpoint(addr));

    let items: Vec<_> = assert_ok!(chat.open(&request("truncated")).await).collect().await;
    assert_eq!(items[0], Ok("half".to_string()));
    assert!(matches!(items[1], Err(TransportError::Protocol(_))));
}

#[tokio::test]
async fn test_synthesizer_returns_url_handle() {
    let (addr, _) = spawn_mock().await;
    let synth = HttpSynthesizer::new(endpoint(addr));

    let audio = assert_ok!(synth.synthesize(synthesis("Good morning")).await);
    assert_eq!(
        audio.handle,
        AudioHandle::Url {
            url: "https://cdn.test/a.mp3".to_string()
        }
    );
    assert_eq!(audio.duration, Some(std::time::Duration::from_millis(1500)));
}

#[tokio::test]
async fn test_synthesizer_ignores_out_of_range_duration() {
    let (addr, _) = spawn_mock().await;
    let synth = HttpSynthesizer::new(endpoint(addr));

    let audio = assert_ok!(synth.synthesize(synthesis("endless")).await);
    assert_eq!(
        audio.handle,
        AudioHandle::Url {
            url: "https://cdn.test/e.mp3".to_string()
        }
    );
    assert!(audio.duration.is_none());
}

#[tokio::test]
async fn test_synthesizer_maps_failures() {
    let (addr, _) = spawn_mock().await;
    let synth = HttpSynthesizer::new(endpoint(addr));

    let err = assert_err!(synth.synthesize(synthesis("unavailable")).await);
    assert!(matches!(err, SynthesisError::Unavailable(_)));
    let err = assert_err!(synth.synthesize(synthesis("broken")).await);
    assert!(matches!(err, SynthesisError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_transcriber_uploads_wav() {
    let (addr, _) = spawn_mock().await;
    let stt = HttpTranscriber::new(endpoint(addr));
    let utterance = Utterance::new(vec![0.1; 800], 16_000);

    let text = assert_ok!(stt.transcribe(&utterance, "en-NG").await);
    assert_eq!(text, format!("{} bytes in en-NG", 44 + 800 * 2));

    // Nothing to upload.
    let empty = Utterance::new(Vec::new(), 16_000);
    assert_eq!(assert_ok!(stt.transcribe(&empty, "en-NG").await), "");
}

#[tokio::test]
async fn test_transcriber_maps_unavailable() {
    let (addr, _) = spawn_mock().await;
    let stt = HttpTranscriber::new(endpoint(addr));
    let utterance = Utterance::new(vec![0.1; 800], 16_000);

    let err = assert_err!(stt.transcribe(&utterance, "none").await);
    assert!(matches!(err, TranscriptionError::Unavailable(_)));
}

#[test]
fn test_endpoint_requires_http_scheme() {
    let endpoint = assert_ok!(ProxyEndpoint::new("http://proxy.test/", None));
    assert_eq!(endpoint.base_url(), "http://proxy.test");
    assert_err!(ProxyEndpoint::new("proxy.test", None));
    assert_err!(ProxyEndpoint::new("ftp://proxy.test", None));
}

#[tokio::test]
async fn test_widget_config_fetch() {
    let (addr, _) = spawn_mock().await;

    let config = assert_ok!(endpoint(addr).widget_config().await);
    assert_eq!(config.voice, "naija_female");
    assert!(!config.auto_play_audio);
    assert_eq!(config.theme, "dark");
    assert!(config.api_key.is_none());
}

#[tokio::test]
async fn test_connect_failure() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let chat = HttpChatStream::new(endpoint(addr));
    let err = chat.open(&request("hi")).await.err().unwrap();
    assert!(matches!(err, TransportError::Connect(_)));
}
