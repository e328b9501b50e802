use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Still streaming, synthesizing or playing.
    Active,
    /// Stream ended and every queue drained.
    Completed,
    /// Cancelled before completion.
    Interrupted,
    /// The token stream failed.
    Errored,
}

impl TurnStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// One user request and the assistant's response to it.
///
/// A turn accepts assistant text only while [`TurnStatus::Active`]. Once it
/// reaches a terminal status it is frozen: further appends and transitions are
/// ignored and reported as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: TurnId,
    pub user_text: String,
    pub assistant_text: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: TurnStatus,
    pub error: Option<String>,
}

impl Turn {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            user_text: user_text.into(),
            assistant_text: String::new(),
            created_at: Utc::now(),
            finished_at: None,
            status: TurnStatus::Active,
            error: None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a streamed delta. Returns `false` if the turn is already terminal.
    pub fn append_assistant(&mut self, delta: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.assistant_text.push_str(delta);
        true
    }

    pub fn complete(&mut self) -> bool {
        self.finish(TurnStatus::Completed, None)
    }

    pub fn interrupt(&mut self) -> bool {
        self.finish(TurnStatus::Interrupted, None)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        self.finish(TurnStatus::Errored, Some(error.into()))
    }

    fn finish(&mut self, status: TurnStatus, error: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_accumulates_text_while_active() {
        let mut turn = Turn::new("hello");
        assert!(turn.append_assistant("Hi"));
        assert!(turn.append_assistant(" there."));
        assert_eq!(turn.assistant_text, "Hi there.");
        assert_eq!(turn.status, TurnStatus::Active);
        assert!(turn.finished_at.is_none());
    }

    #[test]
    fn test_terminal_turn_is_frozen() {
        let mut turn = Turn::new("hello");
        turn.append_assistant("partial");
        assert!(turn.interrupt());

        assert!(!turn.append_assistant(" more"));
        assert!(!turn.complete());
        assert!(!turn.fail("late error"));

        assert_eq!(turn.assistant_text, "partial");
        assert_eq!(turn.status, TurnStatus::Interrupted);
        assert!(turn.error.is_none());
        assert!(turn.finished_at.is_some());
    }

    #[test]
    fn test_fail_records_error() {
        let mut turn = Turn::new("hello");
        assert!(turn.fail("upstream returned 500"));
        assert_eq!(turn.status, TurnStatus::Errored);
        assert_eq!(turn.error.as_deref(), Some("upstream returned 500"));
    }

    #[test]
    fn test_turn_ids_are_unique() {
        assert_ne!(Turn::new("a").id, Turn::new("a").id);
    }
}
