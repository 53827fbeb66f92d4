//! Request and response bodies exchanged with the answer backend.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::{ResponseStyle, TeachingMode};

/// One prior message sent as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A screenshot (or other image) attached to a turn, as a data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attachment(String);

impl Attachment {
    /// Wrap an existing `data:` URI.
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Encode raw image bytes as a base64 data URI.
    pub fn from_image_bytes(mime: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{mime};base64,{encoded}"))
    }

    /// The data URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Payload of a streamed (or fallback) turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Backend credential.
    pub api_key: String,
    /// The user's question.
    pub message: String,
    /// Title of the course being studied.
    pub course_title: String,
    /// Position of the current lecture within the course.
    pub current_lecture_order: u32,
    /// Identifier of the current lecture.
    pub lecture_id: String,
    /// Prior conversation, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Guided vs. direct answers.
    pub teaching_mode: TeachingMode,
    /// Answer tone.
    pub response_style: ResponseStyle,
    /// Hint ladder stage for this question (1..=3).
    pub hint_stage: u8,
    /// Optional screenshot for grounded answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<Attachment>,
}

impl TurnRequest {
    /// Body for the non-streaming chat endpoint, which takes a subset of the fields.
    pub fn fallback_body(&self) -> serde_json::Value {
        serde_json::json!({
            "apiKey": self.api_key,
            "lectureId": self.lecture_id,
            "message": self.message,
            "history": self.history,
        })
    }
}

/// Reply from the non-streaming chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackReply {
    /// Full answer text.
    pub message: String,
    /// Whether the lecture could not answer the question.
    #[serde(default)]
    pub is_not_answerable: bool,
    /// Community link offered with unanswerable questions.
    #[serde(default)]
    pub discord_url: Option<String>,
}

/// Result of the credential verification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVerification {
    /// Whether the key was accepted.
    pub ok: bool,
    /// Backend explanation.
    #[serde(default)]
    pub message: Option<String>,
}

/// Backend health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    /// `ok`, `degraded` or `csv_mode`.
    pub status: String,
    /// Whether the streaming (retrieval) pipeline is available.
    #[serde(default)]
    pub rag_available: bool,
    /// Vector store connectivity, when reported.
    #[serde(default)]
    pub qdrant_connected: Option<bool>,
}

impl BackendHealth {
    /// Whether streamed turns can be expected to work.
    pub fn streaming_available(&self) -> bool {
        self.rag_available && self.status != "degraded"
    }
}
