//! Transcript message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::{Reference, ResponseType};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The learner.
    User,
    /// The tutor.
    Assistant,
}

impl Role {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Opaque per-turn identifier correlating token events with the message they build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generate a fresh id, unique per turn.
    pub fn generate() -> Self {
        Self(format!("turn_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the visible conversation.
///
/// Content may change only while `stream_id` is set; once the id is cleared
/// the message is final.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Text shown to the learner.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Set while an assistant answer is still streaming.
    pub stream_id: Option<StreamId>,
    /// Cited lecture segments (assistant messages, attached at finalization).
    pub references: Option<Vec<Reference>>,
    /// Backend classification (assistant messages, attached at finalization).
    pub response_type: Option<ResponseType>,
    /// Whether reference chips should be shown.
    pub show_references: Option<bool>,
    /// Hint ladder stage the question was asked at (user messages).
    pub hint_stage: Option<u8>,
}

impl Message {
    /// A learner message stamped now.
    pub fn user(content: impl Into<String>, hint_stage: u8) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            stream_id: None,
            references: None,
            response_type: None,
            show_references: None,
            hint_stage: Some(hint_stage),
        }
    }

    /// A finalized assistant message stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            stream_id: None,
            references: None,
            response_type: None,
            show_references: None,
            hint_stage: None,
        }
    }

    /// An in-flight assistant message for `stream_id`.
    pub fn streaming(stream_id: StreamId, content: impl Into<String>) -> Self {
        Self {
            stream_id: Some(stream_id),
            ..Self::assistant(content)
        }
    }

    /// Whether this message is still receiving tokens.
    pub fn is_streaming(&self) -> bool {
        self.stream_id.is_some()
    }

    /// Whether this is a finished assistant answer.
    pub fn is_finalized_assistant(&self) -> bool {
        self.role == Role::Assistant && self.stream_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_are_unique() {
        let a = StreamId::generate();
        let b = StreamId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("turn_"));
    }

    #[test]
    fn streaming_message_is_assistant() {
        let msg = Message::streaming(StreamId::from("s1"), "Hel");
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.is_streaming());
        assert!(!msg.is_finalized_assistant());
    }

    #[test]
    fn user_message_carries_stage() {
        let msg = Message::user("What is a primary key?", 1);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.hint_stage, Some(1));
        assert!(!msg.is_streaming());
    }
}
