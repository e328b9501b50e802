//! Token stream consumption with cancellation and timeouts.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use odia_core::{ChatRequest, ChatStreamPort, DeltaStream, StreamConfig, TransportError, TurnToken};

/// Result of one [`TokenStreamReader::next`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A non-empty fragment of assistant text.
    Delta(String),
    /// The transport signalled completion.
    Finished,
    /// The turn token was set. Not an error.
    Cancelled,
    /// Network, protocol or timeout failure.
    Failed(TransportError),
}

impl ReadOutcome {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// Lazy, non-restartable reader over one chat completion.
///
/// The request is opened on the first [`next`](Self::next) call. Every wait
/// (opening, each chunk) races the turn token and a timeout; the token is
/// re-checked after each wait so a result that lands after cancellation is
/// discarded. Once a terminal outcome is returned it is returned again on
/// every later call.
pub struct TokenStreamReader {
    port: Arc<dyn ChatStreamPort>,
    request: ChatRequest,
    token: TurnToken,
    config: StreamConfig,
    stream: Option<DeltaStream>,
    deltas_seen: usize,
    terminal: Option<ReadOutcome>,
}

impl TokenStreamReader {
    pub fn new(
        port: Arc<dyn ChatStreamPort>,
        request: ChatRequest,
        token: TurnToken,
        config: StreamConfig,
    ) -> Self {
        Self {
            port,
            request,
            token,
            config,
            stream: None,
            deltas_seen: 0,
            terminal: None,
        }
    }

    /// Number of deltas handed out so far.
    pub const fn deltas_seen(&self) -> usize {
        self.deltas_seen
    }

    /// Whether an underlying request is currently open.
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub const fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub async fn next(&mut self) -> ReadOutcome {
        if let Some(outcome) = &self.terminal {
            return outcome.clone();
        }
        if self.token.is_cancelled() {
            return self.finish(ReadOutcome::Cancelled);
        }

        if self.stream.is_none() {
            let ceiling = self.config.first_token_timeout();
            let opened = tokio::select! {
                biased;
                () = self.token.cancelled() => return self.finish(ReadOutcome::Cancelled),
                opened = tokio::time::timeout(ceiling, self.port.open(&self.request)) => opened,
            };
            if self.token.is_cancelled() {
                return self.finish(ReadOutcome::Cancelled);
            }
            match opened {
                Ok(Ok(stream)) => self.stream = Some(stream),
                Ok(Err(e)) => return self.finish(ReadOutcome::Failed(e)),
                Err(_) => return self.finish(ReadOutcome::Failed(TransportError::Timeout(ceiling))),
            }
        }

        loop {
            let ceiling = self.current_ceiling();
            let Some(stream) = self.stream.as_mut() else {
                return self.finish(ReadOutcome::Finished);
            };
            let item = tokio::select! {
                biased;
                () = self.token.cancelled() => return self.finish(ReadOutcome::Cancelled),
                item = tokio::time::timeout(ceiling, stream.next()) => item,
            };
            if self.token.is_cancelled() {
                return self.finish(ReadOutcome::Cancelled);
            }

            match item {
                Err(_) => return self.finish(ReadOutcome::Failed(TransportError::Timeout(ceiling))),
                Ok(None) => return self.finish(ReadOutcome::Finished),
                Ok(Some(Err(e))) => return self.finish(ReadOutcome::Failed(e)),
                Ok(Some(Ok(delta))) if delta.is_empty() => {}
                Ok(Some(Ok(delta))) => {
                    self.deltas_seen += 1;
                    return ReadOutcome::Delta(delta);
                }
            }
        }
    }

    /// Drop the underlying request. Returns `true` if one was still open.
    ///
    /// The reader reports [`ReadOutcome::Cancelled`] afterwards unless it had
    /// already reached a terminal outcome.
    pub fn abort(&mut self) -> bool {
        let was_open = self.stream.take().is_some();
        if self.terminal.is_none() {
            self.terminal = Some(ReadOutcome::Cancelled);
        }
        if was_open {
            tracing::debug!(deltas = self.deltas_seen, "Token stream aborted");
        }
        was_open
    }

    fn current_ceiling(&self) -> Duration {
        // The first delta can take as long as model warm-up.
        if self.deltas_seen == 0 {
            self.config.first_token_timeout()
        } else {
            self.config.idle_timeout()
        }
    }

    fn finish(&mut self, outcome: ReadOutcome) -> ReadOutcome {
        // Dropping the stream aborts the request.
        self.stream = None;
        match &outcome {
            ReadOutcome::Failed(e) => tracing::warn!(error = %e, "Token stream failed"),
            ReadOutcome::Cancelled => tracing::debug!("Token stream cancelled"),
            ReadOutcome::Finished => {
                tracing::debug!(deltas = self.deltas_seen, "Token stream finished");
            }
            ReadOutcome::Delta(_) => {}
        }
        self.terminal = Some(outcome.clone());
        outcome
    }
}
