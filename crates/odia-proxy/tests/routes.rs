//! Route contract tests for the proxy.
//!
//! Requests go through the real router with `tower::ServiceExt::oneshot`.
//! Upstreams are small axum apps bound to ephemeral ports.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use odia_core::contracts::http::{ErrorBody, HealthResponse, SttResponse, TtsResponse};
use odia_core::WidgetConfig;
use odia_proxy::{AppState, ProxyConfig, router};
use serde_json::{Value, json};
use tower::ServiceExt;

// ── Helpers ────────────────────────────────────────────────────────

fn app(config: ProxyConfig) -> Router {
    router(AppState::new(config).unwrap())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes.to_vec())
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: &Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_audio(path: &str, audio: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "audio/wav")
        .body(Body::from(audio.to_vec()))
        .unwrap()
}

fn error_body(bytes: &[u8]) -> ErrorBody {
    serde_json::from_slice(bytes).unwrap()
}

/// What the mock upstreams saw.
#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

fn record(seen: &Seen, headers: &HeaderMap, body: Value) {
    seen.bodies.lock().unwrap().push(body);
    seen.auth.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
}

async fn upstream_chat(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    record(&seen, &headers, body.clone());
    if body["messages"].as_array().and_then(|m| m.last()).and_then(|m| m["content"].as_str())
        == Some("rate me")
    {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there.\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
}

async fn upstream_tts(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    record(&seen, &headers, body.clone());
    match body["text"].as_str() {
        Some("fail") => (StatusCode::INTERNAL_SERVER_ERROR, "engine down").into_response(),
        Some("no duration") => Json(json!({"url": "https://cdn.test/b.mp3"})).into_response(),
        Some("endless clip") => {
            Json(json!({"url": "https://cdn.test/c.mp3", "duration": 1e30})).into_response()
        }
        _ => Json(json!({"audio_url": "https://cdn.test/a.mp3", "duration": 2.5})).into_response(),
    }
}

/// Records the raw multipart body as a string.
async fn upstream_stt(State(seen): State<Seen>, headers: HeaderMap, body: Bytes) -> Response {
    let form = String::from_utf8_lossy(&body).into_owned();
    let refuse = form.contains("\r\n\r\nxx\r\n");
    record(&seen, &headers, Value::String(form));
    if refuse {
        return (StatusCode::BAD_REQUEST, "unsupported language").into_response();
    }
    Json(json!({"text": "  How far?  "})).into_response()
}

async fn spawn_upstream() -> (SocketAddr, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/chat", post(upstream_chat))
        .route("/tts", post(upstream_tts))
        .route("/stt", post(upstream_stt))
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

fn upstream_config(addr: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        chat_upstream_url: format!("http://{addr}/chat"),
        chat_api_key: Some("gsk_upstream_secret".to_string()),
        tts_upstream_url: Some(format!("http://{addr}/tts")),
        tts_api_key: Some("tts_upstream_secret".to_string()),
        stt_upstream_url: format!("http://{addr}/stt"),
        system_prompt: "You are ODIA.".to_string(),
        ..ProxyConfig::default()
    }
}

// ── Health & widget config ─────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let (status, _, body) = send(app(ProxyConfig::default()), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "odia-proxy");
    assert!(!health.timestamp.is_empty());
}

#[tokio::test]
async fn test_widget_config_never_leaks_upstream_keys() {
    let config = ProxyConfig {
        widget_api_key: Some("public-widget".to_string()),
        ..upstream_config(SocketAddr::from(([127, 0, 0, 1], 9)))
    };
    let (status, _, body) = send(app(config), get("/api/widget-config")).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body.clone()).unwrap();
    assert!(!text.contains("upstream_secret"));
    let widget: WidgetConfig = serde_json::from_slice(&body).unwrap();
    assert_eq!(widget.api_key.as_deref(), Some("public-widget"));
    assert!(widget.synthesis_available);
    assert!(widget.auto_play_audio);
}

#[tokio::test]
async fn test_widget_config_reports_missing_tts() {
    let (_, _, body) = send(app(ProxyConfig::default()), get("/api/widget-config")).await;
    let widget: WidgetConfig = serde_json::from_slice(&body).unwrap();
    assert!(!widget.synthesis_available);
    assert!(!widget.transcription_available);
    assert!(widget.api_key.is_none());
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/tts")
        .header(header::ORIGIN, "https://shop.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(app(ProxyConfig::default()), request).await;
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

// ── TTS ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tts_rejects_empty_text() {
    let (status, _, body) = send(
        app(ProxyConfig::default()),
        post_json("/v1/tts", &json!({"text": "   "}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&body).status, 400);
}

#[tokio::test]
async fn test_tts_unavailable_without_upstream() {
    let (status, _, body) = send(
        app(ProxyConfig::default()),
        post_json("/v1/tts", &json!({"text": "Hello"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_body(&body).code.as_deref(), Some("SERVICE_UNAVAILABLE"));
}

#[tokio::test]
async fn test_tts_forwards_and_shapes_response() {
    let (addr, seen) = spawn_upstream().await;
    let (status, _, body) = send(
        app(upstream_config(addr)),
        post_json("/v1/tts", &json!({"text": "Good morning", "voice": "naija_male"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let tts: TtsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(tts.audio_url, "https://cdn.test/a.mp3");
    assert!((tts.duration_secs - 2.5).abs() < f64::EPSILON);
    assert_eq!(tts.voice, "naija_male");

    let upstream = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(upstream["text"], "Good morning");
    assert_eq!(upstream["speed"], 1.0);
    assert_eq!(
        seen.auth.lock().unwrap()[0].as_deref(),
        Some("Bearer tts_upstream_secret")
    );
}

#[tokio::test]
async fn test_tts_duration_falls_back_to_estimate() {
    let (addr, _) = spawn_upstream().await;
    let (status, _, body) = send(
        app(upstream_config(addr)),
        post_json("/v1/tts", &json!({"text": "no duration"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tts: TtsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(tts.audio_url, "https://cdn.test/b.mp3");
    // 11 characters at 50 ms each
    assert!((tts.duration_secs - 0.55).abs() < 1e-9);
}

#[tokio::test]
async fn test_tts_implausible_duration_falls_back_to_estimate() {
    let (addr, _) = spawn_upstream().await;
    let (status, _, body) = send(
        app(upstream_config(addr)),
        post_json("/v1/tts", &json!({"text": "endless clip"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tts: TtsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(tts.audio_url, "https://cdn.test/c.mp3");
    // 12 characters at 50 ms each
    assert!((tts.duration_secs - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_tts_upstream_failure_is_bad_gateway() {
    let (addr, _) = spawn_upstream().await;
    let (status, _, body) = send(
        app(upstream_config(addr)),
        post_json("/v1/tts", &json!({"text": "fail"}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_body(&body).code.as_deref(), Some("TTS_FAILED"));
}

// ── STT ────────────────────────────────────────────────────────────

const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

#[tokio::test]
async fn test_stt_rejects_empty_audio() {
    let (addr, _) = spawn_upstream().await;
    let (status, _, bytes) = send(app(upstream_config(addr)), post_audio("/v1/stt", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_body(&bytes).code.as_deref(), Some("BAD_REQUEST"));
}

#[tokio::test]
async fn test_stt_unavailable_without_key() {
    let (status, _, bytes) = send(app(ProxyConfig::default()), post_audio("/v1/stt", WAV)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        error_body(&bytes).code.as_deref(),
        Some("SERVICE_UNAVAILABLE")
    );
}

#[tokio::test]
async fn test_stt_forwards_multipart_upload() {
    let (addr, seen) = spawn_upstream().await;
    let (status, _, bytes) = send(
        app(upstream_config(addr)),
        post_audio("/v1/stt?language=en-NG", WAV),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let stt: SttResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stt.text, "How far?");

    let form = seen.bodies.lock().unwrap()[0].as_str().unwrap().to_string();
    assert!(form.contains("filename=\"utterance.wav\""));
    assert!(form.contains("RIFF"));
    assert!(form.contains("whisper-large-v3-turbo"));
    assert!(form.contains("name=\"language\"\r\n\r\nen\r\n"));
    // No STT key of its own: the chat key is used.
    assert_eq!(
        seen.auth.lock().unwrap()[0].as_deref(),
        Some("Bearer gsk_upstream_secret")
    );
}

#[tokio::test]
async fn test_stt_upstream_failure_is_bad_gateway() {
    let (addr, _) = spawn_upstream().await;
    let (status, _, bytes) = send(
        app(upstream_config(addr)),
        post_audio("/v1/stt?language=xx", WAV),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let error = error_body(&bytes);
    assert_eq!(error.code.as_deref(), Some("STT_FAILED"));
    assert!(error.error.contains("unsupported language"));
}

// ── Chat ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_rejects_invalid_body() {
    let (status, _, _) = send(
        app(ProxyConfig::default()),
        post_json("/v1/chat/stream", &json!({"nope": true}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        app(ProxyConfig::default()),
        post_json("/v1/chat/stream", &json!({"messages": []}), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_passes_sse_through() {
    let (addr, seen) = spawn_upstream().await;
    let body = json!({"messages": [{"role": "user", "content": "hello"}], "maxTokens": 64});
    let (status, headers, bytes) =
        send(app(upstream_config(addr)), post_json("/v1/chat/stream", &body, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("\" there.\""));
    assert!(text.trim_end().ends_with("data: [DONE]"));

    let upstream = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(upstream["stream"], true);
    assert_eq!(upstream["max_tokens"], 64);
    assert_eq!(upstream["model"], "llama-3.1-8b-instant");
    assert_eq!(upstream["messages"][0]["role"], "system");
    assert_eq!(upstream["messages"][0]["content"], "You are ODIA.");
    assert_eq!(upstream["messages"][1]["content"], "hello");
    assert_eq!(
        seen.auth.lock().unwrap()[0].as_deref(),
        Some("Bearer gsk_upstream_secret")
    );
}

#[tokio::test]
async fn test_chat_upstream_status_is_returned() {
    let (addr, _) = spawn_upstream().await;
    let body = json!({"messages": [{"role": "user", "content": "rate me"}]});
    let (status, _, bytes) =
        send(app(upstream_config(addr)), post_json("/v1/chat/stream", &body, None)).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let error = error_body(&bytes);
    assert_eq!(error.code.as_deref(), Some("CHAT_FAILED"));
    assert!(error.error.contains("slow down"));
}

// ── Widget key ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_widget_key_is_enforced() {
    let (addr, _) = spawn_upstream().await;
    let config = ProxyConfig {
        widget_api_key: Some("public-widget".to_string()),
        ..upstream_config(addr)
    };
    let body = json!({"text": "Hello"});

    let (status, _, bytes) = send(app(config.clone()), post_json("/v1/tts", &body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(&bytes).code.as_deref(), Some("UNAUTHORIZED"));

    let (status, _, _) = send(
        app(config.clone()),
        post_json("/v1/tts", &body, Some("wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(app(config), post_json("/v1/tts", &body, Some("public-widget"))).await;
    assert_eq!(status, StatusCode::OK);

    // Health stays open.
    let (status, _, _) = send(
        app(ProxyConfig {
            widget_api_key: Some("k".to_string()),
            ..ProxyConfig::default()
        }),
        get("/api/health"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
