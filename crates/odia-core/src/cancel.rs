//! Per-turn cancellation.
//!
//! A [`TurnToken`] is created when a turn starts and cloned into every
//! pipeline stage. It can be set once and never reset. The first signal
//! records *why* the turn was cancelled; later signals are no-ops.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Why a turn was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The user started talking over the assistant.
    VoiceActivity,
    /// The user pressed stop (or an equivalent explicit action).
    UserAction,
    /// A new turn was submitted while this one was still active.
    Superseded,
    /// The orchestrator is shutting down.
    Shutdown,
}

/// Shared, one-way cancellation flag scoped to one turn.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Debug, Clone, Default)]
pub struct TurnToken {
    inner: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl TurnToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token.
    ///
    /// Returns `true` only for the call that actually cancelled the turn.
    /// Signalling an already-cancelled token changes nothing.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.inner.cancel();
        tracing::debug!(?reason, "Turn cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// The reason recorded by the first `cancel` call, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    /// Completes once the token is set. Cancel-safe.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// The underlying runtime token, for APIs that take one directly.
    pub fn as_cancellation_token(&self) -> &CancellationToken {
        &self.inner
    }
}
