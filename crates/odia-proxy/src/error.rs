//! Proxy error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use odia_core::contracts::http::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed or empty request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong widget key.
    #[error("Missing or invalid API key")]
    Unauthorized,

    /// The route's upstream is not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The chat upstream refused the request or could not be reached.
    #[error("Chat request failed: {message}")]
    ChatFailed { status: StatusCode, message: String },

    /// The TTS upstream failed or returned no audio.
    #[error("Speech synthesis failed: {0}")]
    TtsFailed(String),

    /// The transcription upstream failed or returned no text field.
    #[error("Transcription failed: {0}")]
    SttFailed(String),
}

impl ProxyError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ChatFailed { status, .. } => *status,
            Self::TtsFailed(_) | Self::SttFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable discriminant for client-side handling.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::ChatFailed { .. } => "CHAT_FAILED",
            Self::TtsFailed(_) => "TTS_FAILED",
            Self::SttFailed(_) => "STT_FAILED",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
            code: Some(self.code().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_is_preserved() {
        let err = ProxyError::ChatFailed {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "CHAT_FAILED");
    }

    #[test]
    fn test_into_response_status() {
        let response = ProxyError::TtsFailed("no audio".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let response = ProxyError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
