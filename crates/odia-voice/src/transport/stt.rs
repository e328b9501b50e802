use async_trait::async_trait;
use odia_core::contracts::http::{STT_PATH, SttQuery, SttResponse};
use odia_core::{SpeechToTextPort, TranscriptionError, Utterance};
use reqwest::StatusCode;

use super::endpoint::ProxyEndpoint;

/// Transcribes utterances through `POST /v1/stt`, uploaded as WAV.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    endpoint: ProxyEndpoint,
}

impl HttpTranscriber {
    pub const fn new(endpoint: ProxyEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SpeechToTextPort for HttpTranscriber {
    async fn transcribe(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<String, TranscriptionError> {
        if utterance.is_empty() {
            return Ok(String::new());
        }
        let query = SttQuery {
            language: Some(language.to_string()).filter(|l| !l.trim().is_empty()),
        };

        let response = self
            .endpoint
            .post(STT_PATH)
            .query(&query)
            .header("content-type", "audio/wav")
            .body(utterance.to_wav())
            .send()
            .await
            .map_err(|e| TranscriptionError::Connect(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Unavailable(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: SttResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;
        tracing::debug!(latency_ms = payload.latency_ms, "Utterance transcribed by proxy");
        Ok(payload.text.trim().to_string())
    }
}
