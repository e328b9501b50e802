use serde::{Deserialize, Serialize};

use super::turn::{Turn, TurnStatus};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Sampling parameters sent with every chat request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        // Short replies keep time-to-first-audio low.
        Self {
            max_tokens: 150,
            temperature: 0.7,
        }
    }
}

/// Request payload for the chat stream port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub params: GenerationParams,
}

impl ChatRequest {
    /// Build the request for a new turn.
    ///
    /// Layout: the system prompt (if non-empty), the most recent
    /// `history_limit` messages from `history`, then the new user message.
    /// Errored turns contribute only their user text; an empty assistant reply
    /// is never sent.
    pub fn for_turn(
        system_prompt: &str,
        history: &[Turn],
        user_text: &str,
        history_limit: usize,
        params: GenerationParams,
    ) -> Self {
        let mut past = Vec::new();
        for turn in history {
            past.push(ChatMessage::user(turn.user_text.clone()));
            let answered = matches!(turn.status, TurnStatus::Completed | TurnStatus::Interrupted);
            if answered && !turn.assistant_text.trim().is_empty() {
                past.push(ChatMessage::assistant(turn.assistant_text.clone()));
            }
        }
        let skip = past.len().saturating_sub(history_limit);

        let mut messages = Vec::with_capacity(history_limit + 2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.extend(past.into_iter().skip(skip));
        messages.push(ChatMessage::user(user_text));

        Self { messages, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(user: &str, assistant: &str) -> Turn {
        let mut turn = Turn::new(user);
        turn.append_assistant(assistant);
        turn.complete();
        turn
    }

    #[test]
    fn test_for_turn_layout() {
        let history = vec![completed("hi", "Hello!")];
        let request =
            ChatRequest::for_turn("Be brief.", &history, "how far?", 10, GenerationParams::default());

        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(request.messages[3].content, "how far?");
        assert_eq!(request.params.max_tokens, 150);
    }

    #[test]
    fn test_for_turn_keeps_only_recent_history() {
        let history: Vec<Turn> = (0..8)
            .map(|i| completed(&format!("q{i}"), &format!("a{i}")))
            .collect();
        let request = ChatRequest::for_turn("", &history, "next", 4, GenerationParams::default());

        // No system prompt, four history messages, then the new one.
        assert_eq!(request.messages.len(), 5);
        assert_eq!(request.messages[0].content, "q6");
        assert_eq!(request.messages[3].content, "a7");
        assert_eq!(request.messages[4].content, "next");
    }

    #[test]
    fn test_errored_turn_contributes_user_text_only() {
        let mut failed = Turn::new("broken");
        failed.append_assistant("half");
        failed.fail("boom");
        let request = ChatRequest::for_turn("", &[failed], "retry", 10, GenerationParams::default());

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "broken");
    }

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest::for_turn("", &[], "hi", 10, GenerationParams::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["maxTokens"], 150);
        assert!(json.get("params").is_none());
    }
}
