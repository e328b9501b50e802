//! Axum HTTP server for the widget proxy.
//!
//! [`router`] builds the app for a given state (tests drive it with
//! `oneshot`); [`serve`] runs it on a pre-bound listener until cancelled.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, header},
    response::Response,
    routing::{get, post},
};
use bytes::Bytes;
use odia_core::WidgetConfig;
use odia_core::contracts::http::{
    CHAT_STREAM_PATH, ChatStreamBody, HEALTH_PATH, HealthResponse, STT_PATH, SttQuery, SttResponse,
    TTS_PATH, TtsBody, TtsResponse, WIDGET_CONFIG_PATH,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::{forward_chat_stream, synthesize, transcribe};

/// Largest WAV upload `/v1/stt` accepts.
const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state for the proxy server.
#[derive(Clone)]
pub struct AppState {
    /// HTTP client for upstream requests.
    client: Client,
    config: Arc<ProxyConfig>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: ProxyConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Build the router with CORS open to any origin.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(WIDGET_CONFIG_PATH, get(widget_config))
        .route(CHAT_STREAM_PATH, post(chat_stream))
        .route(TTS_PATH, post(tts))
        .route(STT_PATH, post(stt).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the proxy on a pre-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(
        %addr,
        chat_model = %state.config.chat_model,
        synthesis = state.config.synthesis_available(),
        transcription = state.config.transcription_available(),
        widget_key = state.config.widget_api_key.is_some(),
        "Proxy server starting"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Proxy server shut down");
    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────────

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn widget_config(State(state): State<AppState>) -> Json<WidgetConfig> {
    Json(state.config.widget_config())
}

async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    debug!("POST {CHAT_STREAM_PATH}");
    authorize(&state.config, &headers)?;
    let body: ChatStreamBody = parse_body(&body)?;
    forward_chat_stream(&state.client, &state.config, body).await
}

async fn tts(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TtsResponse>, ProxyError> {
    debug!("POST {TTS_PATH}");
    authorize(&state.config, &headers)?;
    let body: TtsBody = parse_body(&body)?;
    synthesize(&state.client, &state.config, body).await.map(Json)
}

async fn stt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SttQuery>,
    body: Bytes,
) -> Result<Json<SttResponse>, ProxyError> {
    debug!("POST {STT_PATH}");
    authorize(&state.config, &headers)?;
    transcribe(&state.client, &state.config, body, query)
        .await
        .map(Json)
}

/// Require `Authorization: Bearer <widget key>` when a key is configured.
fn authorize(config: &ProxyConfig, headers: &HeaderMap) -> Result<(), ProxyError> {
    let Some(expected) = &config.widget_api_key else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ProxyError::Unauthorized)
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProxyError> {
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::BadRequest(format!("Invalid request body: {e}")))
}

