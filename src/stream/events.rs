//! Typed protocol events carried by the turn stream.
//!
//! Every event line is a JSON object with a `type` discriminator:
//!
//! ```text
//! {"type":"token","content":"A primary key "}
//! {"type":"error","content":"Error: upstream timeout"}
//! {"type":"done","references":[...],"responseType":"in_scope","showReferences":true}
//! ```
//!
//! # Examples
//!
//! ```
//! use lecture_tutor::stream::events::{ResponseType, StreamEvent};
//!
//! let event: StreamEvent =
//!     serde_json::from_str(r#"{"type":"done","references":[],"responseType":"rate_limited"}"#)
//!         .unwrap_or(StreamEvent::Error { content: String::new() });
//! match event {
//!     StreamEvent::Done(done) => {
//!         assert_eq!(done.response_type, ResponseType::RateLimited);
//!         assert!(done.show_references);
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use serde::{Deserialize, Serialize};

/// A lecture segment cited by a finalized answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Title of the cited lecture.
    #[serde(alias = "lecture_title")]
    pub lecture_title: String,
    /// Title of the chapter containing the lecture.
    #[serde(alias = "chapter_title")]
    pub chapter_title: String,
    /// Position in the lecture video (`mm:ss`).
    pub timestamp: String,
    /// Deep link to the cited position.
    pub url: String,
}

/// Backend classification of a finished answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Answered from the current (or earlier) lectures.
    #[default]
    InScope,
    /// Topic is covered in a later lecture.
    FutureTopic,
    /// Topic is not covered by the course.
    OffTopic,
    /// Backend refused because of rate limits.
    RateLimited,
    /// Generation failed server-side.
    Error,
    /// Any tag this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ResponseType {
    /// Whether this classification counts as a successfully completed turn.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::RateLimited | Self::Error)
    }

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InScope => "in_scope",
            Self::FutureTopic => "future_topic",
            Self::OffTopic => "off_topic",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Final metadata attached to an answer by the `done` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    /// Cited lecture segments, in display order.
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Classification tag.
    #[serde(default)]
    pub response_type: ResponseType,
    /// Whether reference chips should be shown.
    #[serde(default = "default_true")]
    pub show_references: bool,
    /// Whether the backend served this answer from its own cache.
    #[serde(default)]
    pub cache_hit: bool,
}

impl Default for DonePayload {
    fn default() -> Self {
        Self {
            references: Vec::new(),
            response_type: ResponseType::InScope,
            show_references: true,
            cache_hit: false,
        }
    }
}

/// One decoded protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A fragment of answer text.
    Token {
        /// The text fragment.
        content: String,
    },
    /// A server-side failure description.
    Error {
        /// Human-readable failure text.
        content: String,
    },
    /// End of the answer with its metadata.
    Done(DonePayload),
}

impl StreamEvent {
    /// Shorthand for a token event.
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    /// Shorthand for an error event.
    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Whether this is the terminal `done` event.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn token_event_parses() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"token","content":"A primary key "}"#).unwrap();
        assert_eq!(event, StreamEvent::token("A primary key "));
    }

    #[test]
    fn error_event_parses() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"error","content":"Error: boom"}"#).unwrap();
        assert_eq!(event, StreamEvent::error("Error: boom"));
    }

    #[test]
    fn done_defaults_show_references_to_true() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"done","references":[],"responseType":"in_scope"}"#,
        )
        .unwrap();
        match event {
            StreamEvent::Done(done) => {
                assert!(done.show_references);
                assert!(!done.cache_hit);
                assert_eq!(done.response_type, ResponseType::InScope);
            }
            _ => unreachable!("expected done"),
        }
    }

    #[test]
    fn done_accepts_snake_case_references() {
        let json = r#"{"type":"done","references":[{"lecture_title":"Keys","chapter_title":"SQL","timestamp":"03:15","url":"https://x/1?t=195"}],"responseType":"in_scope","showReferences":false,"cacheHit":true}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::Done(done) => {
                assert_eq!(done.references.len(), 1);
                assert_eq!(done.references[0].lecture_title, "Keys");
                assert_eq!(done.references[0].timestamp, "03:15");
                assert!(!done.show_references);
                assert!(done.cache_hit);
            }
            _ => unreachable!("expected done"),
        }
    }

    #[test]
    fn done_accepts_camel_case_references() {
        let json = r#"{"type":"done","references":[{"lectureTitle":"Keys","chapterTitle":"SQL","timestamp":"00:05","url":"u"}]}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert!(event.is_done());
    }

    #[test]
    fn unknown_response_type_is_tolerated() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"done","responseType":"brand_new_tag"}"#).unwrap();
        match event {
            StreamEvent::Done(done) => assert_eq!(done.response_type, ResponseType::Unknown),
            _ => unreachable!("expected done"),
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let parsed = serde_json::from_str::<StreamEvent>(r#"{"type":"ping"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn success_classification() {
        assert!(ResponseType::InScope.is_success());
        assert!(ResponseType::FutureTopic.is_success());
        assert!(ResponseType::OffTopic.is_success());
        assert!(!ResponseType::RateLimited.is_success());
        assert!(!ResponseType::Error.is_success());
    }
}
