//! Events emitted by the conversation orchestrator.
//!
//! These are the only things a UI needs to render the widget: the coarse
//! status, streamed text, per-chunk audio progress and finished turns.

use serde::{Deserialize, Serialize};

use crate::cancel::CancelReason;
use crate::domain::{Turn, TurnId, VoiceActivityState};

/// Externally observable widget status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetStatus {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    StatusChanged {
        status: WidgetStatus,
    },
    TurnStarted {
        turn_id: TurnId,
        user_text: String,
    },
    TextDelta {
        turn_id: TurnId,
        delta: String,
    },
    ChunkQueued {
        turn_id: TurnId,
        index: u64,
        text: String,
    },
    AudioStarted {
        turn_id: TurnId,
        index: u64,
    },
    AudioFinished {
        turn_id: TurnId,
        index: u64,
    },
    /// No audio will play for this chunk (unspeakable, synthesis or playback failure).
    AudioSkipped {
        turn_id: TurnId,
        index: u64,
    },
    TurnInterrupted {
        turn_id: TurnId,
        reason: CancelReason,
    },
    TurnFinished {
        turn: Turn,
    },
    VoiceActivity {
        state: VoiceActivityState,
    },
    /// Sustained silence closed the microphone session.
    ListeningEnded,
    /// Voice input was recognized; a turn with this text follows.
    Transcribed {
        text: String,
    },
    /// Barge-in detection is off for this session (microphone unavailable).
    InterruptionUnavailable {
        reason: String,
    },
    /// User-visible error. At most one per turn.
    Error {
        turn_id: Option<TurnId>,
        message: String,
    },
}
