//! Transcript persistence keyed by lecture.
//!
//! Each lecture's visible conversation is stored under `chat_{lecture_id}`
//! as a JSON array of [`StoredMessage`]. Only the newest `max_messages`
//! entries are kept. Persistence is best-effort: write failures are logged
//! and swallowed, unreadable entries restore as an empty transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::kv::KeyValueStore;
use crate::chat::message::{Message, Role};
use crate::stream::{Reference, ResponseType};

/// Default cap on stored messages per lecture.
pub const DEFAULT_MAX_MESSAGES: usize = 50;

/// Storage-safe projection of a [`Message`]. Never carries a stream id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Author.
    pub role: Role,
    /// Text.
    pub content: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Cited lecture segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Reference>>,
    /// Backend classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    /// Whether reference chips are shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_references: Option<bool>,
    /// Hint stage of a user question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_stage: Option<u8>,
}

impl From<&Message> for StoredMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            timestamp: msg.timestamp.to_rfc3339(),
            references: msg.references.clone(),
            response_type: msg.response_type,
            show_references: msg.show_references,
            hint_stage: msg.hint_stage,
        }
    }
}

impl StoredMessage {
    /// Rebuild a finalized [`Message`]. Unparseable timestamps become now.
    pub fn into_message(self) -> Message {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Message {
            role: self.role,
            content: self.content,
            timestamp,
            stream_id: None,
            references: self.references,
            response_type: self.response_type,
            show_references: self.show_references,
            hint_stage: self.hint_stage,
        }
    }
}

/// Per-lecture transcript store over any [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct SessionStore<K> {
    store: K,
    max_messages: usize,
}

impl<K: KeyValueStore> SessionStore<K> {
    /// Wrap `store`, keeping at most `max_messages` per lecture.
    pub fn new(store: K, max_messages: usize) -> Self {
        Self {
            store,
            max_messages: max_messages.max(1),
        }
    }

    /// The underlying key-value store.
    pub fn inner(&self) -> &K {
        &self.store
    }

    /// Storage key for a lecture.
    pub fn key_for(lecture_id: &str) -> String {
        format!("chat_{lecture_id}")
    }

    /// Persist the newest `max_messages` entries of `transcript`.
    ///
    /// Failures are logged, never returned.
    pub async fn save(&self, lecture_id: &str, transcript: &[Message]) {
        let start = transcript.len().saturating_sub(self.max_messages);
        let projected: Vec<StoredMessage> =
            transcript[start..].iter().map(StoredMessage::from).collect();

        let json = match serde_json::to_string(&projected) {
            Ok(json) => json,
            Err(e) => {
                warn!(lecture_id, "failed to serialize transcript: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&Self::key_for(lecture_id), &json).await {
            warn!(lecture_id, "transcript not persisted: {e}");
        }
    }

    /// Restore a lecture's transcript; empty when absent or unreadable.
    pub async fn load(&self, lecture_id: &str) -> Vec<Message> {
        let raw = match self.store.get(&Self::key_for(lecture_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(lecture_id, "failed to read stored transcript: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<StoredMessage>>(&raw) {
            Ok(stored) => {
                debug!(lecture_id, count = stored.len(), "restored transcript");
                stored.into_iter().map(StoredMessage::into_message).collect()
            }
            Err(e) => {
                warn!(lecture_id, "discarding unreadable transcript: {e}");
                Vec::new()
            }
        }
    }

    /// Forget a lecture's transcript.
    pub async fn reset(&self, lecture_id: &str) {
        if let Err(e) = self.store.remove(&Self::key_for(lecture_id)).await {
            warn!(lecture_id, "failed to clear stored transcript: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::chat::message::StreamId;
    use crate::storage::kv::MemoryStore;

    fn numbered(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("q{i}"), 1)
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let sessions = SessionStore::new(MemoryStore::new(), DEFAULT_MAX_MESSAGES);
        let mut answer = Message::assistant("A primary key uniquely identifies a row.");
        answer.references = Some(vec![Reference {
            lecture_title: "Keys".into(),
            chapter_title: "Relational Model".into(),
            timestamp: "03:15".into(),
            url: "https://course.example/lec-4?t=195".into(),
        }]);
        answer.response_type = Some(ResponseType::InScope);
        answer.show_references = Some(true);
        let transcript = vec![Message::user("What is a primary key?", 1), answer];

        sessions.save("lec-4", &transcript).await;
        let restored = sessions.load("lec-4").await;

        assert_eq!(restored.len(), 2);
        assert_eq!(restored[1].content, transcript[1].content);
        assert_eq!(restored[1].references, transcript[1].references);
        assert_eq!(restored[1].response_type, Some(ResponseType::InScope));
        assert_eq!(restored[0].hint_stage, Some(1));
        assert_eq!(restored[0].timestamp.timestamp(), transcript[0].timestamp.timestamp());
    }

    #[tokio::test]
    async fn keeps_only_newest_fifty() {
        let sessions = SessionStore::new(MemoryStore::new(), DEFAULT_MAX_MESSAGES);
        sessions.save("lec", &numbered(51)).await;

        let restored = sessions.load("lec").await;
        assert_eq!(restored.len(), 50);
        // Position 0 ("q0") was evicted.
        assert_eq!(restored[0].content, "a1");
        assert_eq!(restored[49].content, "q50");
    }

    #[tokio::test]
    async fn stream_ids_are_not_persisted() {
        let store = MemoryStore::new();
        let sessions = SessionStore::new(store.clone(), DEFAULT_MAX_MESSAGES);
        sessions
            .save("lec", &[Message::streaming(StreamId::from("s1"), "partial")])
            .await;

        let raw = store.get("chat_lec").await.unwrap().unwrap();
        assert!(!raw.contains("s1"));
        assert!(!sessions.load("lec").await[0].is_streaming());
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let sessions = SessionStore::new(MemoryStore::with_quota(16), DEFAULT_MAX_MESSAGES);
        sessions.save("lec", &numbered(4)).await;
        assert!(sessions.load("lec").await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_entry_restores_empty() {
        let store = MemoryStore::new();
        store.set("chat_lec", "not json").await.unwrap();
        let sessions = SessionStore::new(store, DEFAULT_MAX_MESSAGES);
        assert!(sessions.load("lec").await.is_empty());
    }

    #[tokio::test]
    async fn reset_clears_one_lecture() {
        let sessions = SessionStore::new(MemoryStore::new(), DEFAULT_MAX_MESSAGES);
        sessions.save("a", &numbered(2)).await;
        sessions.save("b", &numbered(2)).await;
        sessions.reset("a").await;
        assert!(sessions.load("a").await.is_empty());
        assert_eq!(sessions.load("b").await.len(), 2);
    }

    #[test]
    fn stored_message_uses_camel_case() {
        let mut msg = Message::assistant("x");
        msg.show_references = Some(false);
        let json = serde_json::to_string(&StoredMessage::from(&msg)).unwrap();
        assert!(json.contains("\"showReferences\":false"));
        assert!(!json.contains("hintStage"));
    }
}
