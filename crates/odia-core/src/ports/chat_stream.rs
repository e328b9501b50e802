use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::domain::ChatRequest;

/// Incremental assistant text. Ends when the transport signals completion.
pub type DeltaStream = BoxStream<'static, Result<String, TransportError>>;

/// Failures of the chat completion stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not reach the endpoint or the connection dropped.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The endpoint answered with a non-2xx status.
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The stream was not well-formed.
    #[error("Malformed stream: {0}")]
    Protocol(String),

    /// No data arrived within the configured ceiling.
    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// Opens a streamed chat completion.
#[async_trait]
pub trait ChatStreamPort: Send + Sync {
    /// Start a completion for `request`.
    ///
    /// Dropping the returned stream must abort the underlying request.
    async fn open(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError>;
}
