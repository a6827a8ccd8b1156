//! Conversation log and the send/reply state machine.
//!
//! A turn moves `idle -> sent -> resolved | errored -> idle`. Sending appends
//! the user message and a pending assistant placeholder in one step; the
//! placeholder is later rewritten in place exactly once.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::api::{ApiClient, WireMessage};
use crate::error::ApiError;

pub const WELCOME_ID: &str = "welcome";
pub const WELCOME_TEXT: &str = "Hi! I'm your assistant. Ask me anything ✨";
pub const PLACEHOLDER_TEXT: &str = "Thinking…";
pub const MOCK_DELAY: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub pending: bool,
}

impl Message {
    fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.text.clone(),
        }
    }
}

/// Millisecond timestamps, bumped when two ids would land on the same tick.
#[derive(Debug, Default)]
pub struct IdGen {
    last: u128,
}

impl IdGen {
    pub fn next(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.last = now.max(self.last + 1);
        self.last.to_string()
    }
}

/// A turn that has been accepted and is waiting for its reply
#[derive(Debug, Clone)]
pub struct Turn {
    pub placeholder_id: String,
    pub text: String,
    /// Prior log in order, followed by the new user message
    pub history: Vec<WireMessage>,
}

pub struct ChatSession {
    pub messages: Vec<Message>,
    pub input: String,
    sending: bool,
    ids: IdGen,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: vec![Message {
                id: WELCOME_ID.to_string(),
                role: Role::Assistant,
                text: WELCOME_TEXT.to_string(),
                pending: false,
            }],
            input: String::new(),
            sending: false,
            ids: IdGen::default(),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn can_send(&self) -> bool {
        !self.input.trim().is_empty() && !self.sending
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Explicit send of whatever is in the input buffer.
    pub fn send(&mut self) -> Option<Turn> {
        let text = self.input.trim().to_string();
        self.submit(text)
    }

    /// Replace the input buffer. A trailing newline is a send trigger rather
    /// than content: the newline run is stripped and the rest is sent.
    pub fn set_input(&mut self, buffer: String) -> Option<Turn> {
        if !buffer.ends_with('\n') {
            self.input = buffer;
            return None;
        }

        let text = buffer.trim_end_matches('\n').to_string();
        if text.trim().is_empty() || self.sending {
            // Not sendable right now; keep what was typed minus the newline.
            self.input = text;
            return None;
        }
        self.submit(text)
    }

    fn submit(&mut self, text: String) -> Option<Turn> {
        if text.trim().is_empty() || self.sending {
            return None;
        }

        let mut history: Vec<WireMessage> = self.messages.iter().map(Message::to_wire).collect();
        history.push(WireMessage {
            role: Role::User,
            content: text.clone(),
        });

        let user = Message {
            id: self.ids.next(),
            role: Role::User,
            text: text.clone(),
            pending: false,
        };
        let placeholder = Message {
            id: self.ids.next(),
            role: Role::Assistant,
            text: PLACEHOLDER_TEXT.to_string(),
            pending: true,
        };
        let placeholder_id = placeholder.id.clone();

        self.messages.push(user);
        self.messages.push(placeholder);
        self.input.clear();
        self.sending = true;

        tracing::info!(id = %placeholder_id, len = text.chars().count(), "turn sent");
        Some(Turn {
            placeholder_id,
            text,
            history,
        })
    }

    /// Settle a turn. Only a still-pending placeholder is touched.
    pub fn resolve(&mut self, placeholder_id: &str, result: Result<String, ApiError>) {
        let Some(msg) = self
            .messages
            .iter_mut()
            .find(|m| m.id == placeholder_id && m.pending)
        else {
            tracing::debug!(id = placeholder_id, "resolution for unknown or settled turn ignored");
            return;
        };

        msg.pending = false;
        msg.text = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(id = placeholder_id, error = %e, "turn failed");
                format!("Error: {}", e)
            }
        };
        self.sending = false;
    }
}

/// Where replies come from
#[derive(Clone)]
pub enum Replier {
    Mock { delay: Duration },
    Backend(ApiClient),
}

impl Replier {
    pub fn mock() -> Self {
        Replier::Mock { delay: MOCK_DELAY }
    }

    pub async fn reply(&self, turn: &Turn) -> Result<String, ApiError> {
        match self {
            Replier::Mock { delay } => {
                tokio::time::sleep(*delay).await;
                Ok(mock_reply(&turn.text))
            }
            Replier::Backend(api) => api.chat(&turn.history).await,
        }
    }
}

pub fn mock_reply(text: &str) -> String {
    format!("You said: \"{}\". (Mock reply)", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(session: &mut ChatSession, text: &str) -> Option<Turn> {
        session.set_input(text.to_string())
    }

    #[test]
    fn send_appends_user_and_pending_placeholder() {
        let mut session = ChatSession::new();
        typed(&mut session, "  hello  ");
        let turn = session.send().unwrap();

        assert_eq!(session.messages.len(), 3);
        let user = &session.messages[1];
        let placeholder = &session.messages[2];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.text, "hello");
        assert!(!user.pending);
        assert_eq!(placeholder.role, Role::Assistant);
        assert_eq!(placeholder.text, PLACEHOLDER_TEXT);
        assert!(placeholder.pending);
        assert_eq!(turn.placeholder_id, placeholder.id);
        assert_ne!(user.id, placeholder.id);
        assert!(session.input.is_empty());
        assert!(session.is_sending());
    }

    #[test]
    fn blank_input_is_not_sent() {
        let mut session = ChatSession::new();
        typed(&mut session, "   ");
        assert!(!session.can_send());
        assert!(session.send().is_none());
        assert!(typed(&mut session, " \n").is_none());
        assert_eq!(session.messages.len(), 1);
        assert!(!session.is_sending());
    }

    #[test]
    fn second_send_while_in_flight_changes_nothing() {
        let mut session = ChatSession::new();
        typed(&mut session, "first");
        session.send().unwrap();

        typed(&mut session, "second");
        let before = session.messages.clone();
        assert!(!session.can_send());
        assert!(session.send().is_none());
        assert!(typed(&mut session, "second\n").is_none());
        assert_eq!(session.messages, before);
        assert!(session.is_sending());
        assert_eq!(session.input, "second");
    }

    #[test]
    fn trailing_newline_sends_like_explicit_send() {
        let mut by_newline = ChatSession::new();
        let turn = typed(&mut by_newline, "hi\n").unwrap();
        assert!(by_newline.input.is_empty());

        let mut by_button = ChatSession::new();
        typed(&mut by_button, "hi");
        let explicit = by_button.send().unwrap();

        assert_eq!(turn.text, explicit.text);
        assert_eq!(turn.history, explicit.history);
        assert_eq!(by_newline.messages[1].text, "hi");
    }

    #[test]
    fn newline_run_is_stripped() {
        let mut session = ChatSession::new();
        let turn = typed(&mut session, "two lines\nhere\n\n\n").unwrap();
        assert_eq!(turn.text, "two lines\nhere");
    }

    #[test]
    fn history_is_prior_log_plus_new_turn() {
        let mut session = ChatSession::new();
        let first = typed(&mut session, "one\n").unwrap();
        session.resolve(&first.placeholder_id, Ok("reply one".into()));

        let second = typed(&mut session, "two\n").unwrap();
        let contents: Vec<&str> = second.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec![WELCOME_TEXT, "one", "reply one", "two"]);
        assert_eq!(second.history.last().unwrap().role, Role::User);
    }

    #[test]
    fn resolve_updates_placeholder_in_place() {
        let mut session = ChatSession::new();
        let turn = typed(&mut session, "hello\n").unwrap();
        session.resolve(&turn.placeholder_id, Ok("world".into()));

        let msg = session.find(&turn.placeholder_id).unwrap();
        assert_eq!(msg.text, "world");
        assert!(!msg.pending);
        assert!(!session.is_sending());
        assert_eq!(session.messages[2].id, turn.placeholder_id);
    }

    #[test]
    fn error_is_written_into_placeholder() {
        let mut session = ChatSession::new();
        let turn = typed(&mut session, "hello\n").unwrap();
        session.resolve(&turn.placeholder_id, Err(ApiError::Status(502)));

        let msg = session.find(&turn.placeholder_id).unwrap();
        assert_eq!(msg.text, "Error: HTTP 502");
        assert!(!msg.pending);
        assert!(!session.is_sending());
    }

    #[test]
    fn placeholder_is_only_settled_once() {
        let mut session = ChatSession::new();
        let turn = typed(&mut session, "hello\n").unwrap();
        session.resolve(&turn.placeholder_id, Ok("first".into()));
        session.resolve(&turn.placeholder_id, Ok("second".into()));
        assert_eq!(session.find(&turn.placeholder_id).unwrap().text, "first");
    }

    #[test]
    fn ids_strictly_increase() {
        let mut ids = IdGen::default();
        let a: u128 = ids.next().parse().unwrap();
        let b: u128 = ids.next().parse().unwrap();
        let c: u128 = ids.next().parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let wire = WireMessage { role: Role::Assistant, content: "x".into() };
        assert_eq!(
            serde_json::to_string(&wire).unwrap(),
            r#"{"role":"assistant","content":"x"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mock_reply_echoes_input_after_delay() {
        let mut session = ChatSession::new();
        let turn = typed(&mut session, "hello\n").unwrap();

        let started = tokio::time::Instant::now();
        let reply = Replier::mock().reply(&turn).await.unwrap();
        assert_eq!(reply, "You said: \"hello\". (Mock reply)");
        assert!(started.elapsed() >= MOCK_DELAY);
    }
}
