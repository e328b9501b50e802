use std::time::Duration;

use async_trait::async_trait;
use odia_core::contracts::http::{TTS_PATH, TtsBody, TtsResponse};
use odia_core::{AudioHandle, SpeechSynthesisPort, SynthesisError, SynthesisRequest, SynthesizedAudio};
use reqwest::StatusCode;

use super::endpoint::ProxyEndpoint;

/// Synthesizes chunks through `POST /v1/tts`.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    endpoint: ProxyEndpoint,
}

impl HttpSynthesizer {
    pub const fn new(endpoint: ProxyEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl SpeechSynthesisPort for HttpSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesizedAudio, SynthesisError> {
        let body = TtsBody {
            text: request.text,
            voice: Some(request.voice),
            speed: Some(request.speed),
            pitch: Some(request.pitch),
        };

        let response = self
            .endpoint
            .post(TTS_PATH)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Connect(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Unavailable(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TtsResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(e.to_string()))?;
        if payload.audio_url.trim().is_empty() {
            return Err(SynthesisError::InvalidResponse("empty audioUrl".to_string()));
        }

        // Out-of-range values fall back to the playback estimate
        let duration = Some(payload.duration_secs)
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        Ok(SynthesizedAudio {
            handle: AudioHandle::Url {
                url: payload.audio_url,
            },
            duration,
        })
    }
}
