use async_trait::async_trait;
use odia_core::contracts::http::{CHAT_STREAM_PATH, ChatStreamBody};
use odia_core::{ChatRequest, ChatStreamPort, DeltaStream, TransportError};

use super::endpoint::ProxyEndpoint;
use super::sse::sse_deltas;

/// Streams chat completions from `POST /v1/chat/stream`.
#[derive(Debug, Clone)]
pub struct HttpChatStream {
    endpoint: ProxyEndpoint,
}

impl HttpChatStream {
    pub const fn new(endpoint: ProxyEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ChatStreamPort for HttpChatStream {
    async fn open(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError> {
        let body = ChatStreamBody::new(request.messages.clone(), request.params);
        tracing::debug!(messages = body.messages.len(), "Opening chat stream");

        let response = self
            .endpoint
            .post(CHAT_STREAM_PATH)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(sse_deltas(response.bytes_stream()))
    }
}
