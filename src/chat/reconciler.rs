//! Merges one turn's event stream into the transcript.
//!
//! A [`MessageReconciler`] is created per turn with that turn's
//! [`StreamId`]. Token events grow a single in-flight assistant message,
//! `done` attaches metadata and clears the id (freezing the content), and
//! `error` appends a separate assistant message without touching the
//! in-flight one.

use tracing::debug;

use super::message::{Message, StreamId};
use super::rate_limit::friendly_error_message;
use crate::stream::{DonePayload, StreamEvent};

/// What applying one event did to the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// First token: a new in-flight message was appended.
    Started,
    /// A later token was appended to the in-flight message.
    Extended,
    /// The in-flight message was finalized.
    Finalized {
        /// Final answer text, `None` when no token ever arrived.
        content: Option<String>,
        /// Metadata from the `done` event.
        payload: DonePayload,
    },
    /// A separate error message was appended.
    ErrorAppended {
        /// Raw error text from the backend.
        raw: String,
    },
    /// The event arrived after finalization and was ignored.
    Ignored,
}

/// Per-turn reconciliation state.
#[derive(Debug)]
pub struct MessageReconciler {
    stream_id: StreamId,
    tokens: usize,
    errored: bool,
    finalized: bool,
}

impl MessageReconciler {
    /// Create a reconciler for the turn identified by `stream_id`.
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            tokens: 0,
            errored: false,
            finalized: false,
        }
    }

    /// The turn's stream id.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Whether at least one token was applied.
    pub fn saw_tokens(&self) -> bool {
        self.tokens > 0
    }

    /// Whether an `error` event was applied.
    pub fn saw_error(&self) -> bool {
        self.errored
    }

    /// Whether `done` was applied.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn position(&self, transcript: &[Message]) -> Option<usize> {
        transcript
            .iter()
            .rposition(|m| m.stream_id.as_ref() == Some(&self.stream_id))
    }

    /// Apply one event to the transcript.
    pub fn apply(&mut self, transcript: &mut Vec<Message>, event: &StreamEvent) -> Applied {
        if self.finalized {
            debug!(stream_id = %self.stream_id, "ignoring event after done: {event:?}");
            return Applied::Ignored;
        }

        match event {
            StreamEvent::Token { content } => {
                self.tokens += 1;
                match self.position(transcript) {
                    Some(idx) => {
                        transcript[idx].content.push_str(content);
                        Applied::Extended
                    }
                    None => {
                        transcript.push(Message::streaming(self.stream_id.clone(), content.clone()));
                        Applied::Started
                    }
                }
            }
            StreamEvent::Done(payload) => {
                self.finalized = true;
                let content = self.position(transcript).map(|idx| {
                    let msg = &mut transcript[idx];
                    msg.references = Some(payload.references.clone());
                    msg.response_type = Some(payload.response_type);
                    msg.show_references = Some(payload.show_references);
                    msg.stream_id = None;
                    msg.content.clone()
                });
                Applied::Finalized {
                    content,
                    payload: payload.clone(),
                }
            }
            StreamEvent::Error { content } => {
                self.errored = true;
                transcript.push(Message::assistant(friendly_error_message(content)));
                Applied::ErrorAppended {
                    raw: content.clone(),
                }
            }
        }
    }

    /// Finalize any partial in-flight message as-is, without metadata.
    pub fn freeze(&mut self, transcript: &mut [Message]) {
        if let Some(idx) = self.position(transcript) {
            transcript[idx].stream_id = None;
        }
        self.finalized = true;
    }

    /// End the turn without a `done` event.
    ///
    /// Freezes any partial in-flight message and appends one error
    /// message describing `reason`.
    pub fn abort(&mut self, transcript: &mut Vec<Message>, reason: &str) {
        self.freeze(transcript);
        self.errored = true;
        transcript.push(Message::assistant(friendly_error_message(reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Role;
    use crate::stream::{Reference, ResponseType};

    fn done(response_type: ResponseType) -> StreamEvent {
        StreamEvent::Done(DonePayload {
            references: vec![Reference {
                lecture_title: "Keys".into(),
                chapter_title: "Relational Model".into(),
                timestamp: "03:15".into(),
                url: "https://course.example/lec-4?t=195".into(),
            }],
            response_type,
            show_references: true,
            cache_hit: false,
        })
    }

    #[test]
    fn tokens_concatenate_in_order() {
        let mut transcript = vec![Message::user("What is a primary key?", 1)];
        let mut rec = MessageReconciler::new(StreamId::from("s1"));

        assert_eq!(rec.apply(&mut transcript, &StreamEvent::token("A primary key ")), Applied::Started);
        assert_eq!(rec.apply(&mut transcript, &StreamEvent::token("uniquely iden")), Applied::Extended);
        assert_eq!(rec.apply(&mut transcript, &StreamEvent::token("tifies a row.")), Applied::Extended);

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "A primary key uniquely identifies a row.");
        assert!(transcript[1].is_streaming());
    }

    #[test]
    fn done_mutates_only_metadata() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        rec.apply(&mut transcript, &StreamEvent::token("A primary key "));
        rec.apply(&mut transcript, &StreamEvent::token("uniquely identifies a row."));

        let applied = rec.apply(&mut transcript, &done(ResponseType::InScope));
        match applied {
            Applied::Finalized { content, payload } => {
                assert_eq!(content.as_deref(), Some("A primary key uniquely identifies a row."));
                assert_eq!(payload.response_type, ResponseType::InScope);
            }
            other => unreachable!("expected finalized, got {other:?}"),
        }
        let msg = &transcript[0];
        assert_eq!(msg.content, "A primary key uniquely identifies a row.");
        assert!(!msg.is_streaming());
        assert_eq!(msg.references.as_ref().map(Vec::len), Some(1));
        assert_eq!(msg.response_type, Some(ResponseType::InScope));
        assert_eq!(msg.show_references, Some(true));
    }

    #[test]
    fn events_after_done_are_ignored() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        rec.apply(&mut transcript, &StreamEvent::token("final"));
        rec.apply(&mut transcript, &done(ResponseType::InScope));

        assert_eq!(rec.apply(&mut transcript, &StreamEvent::token(" extra")), Applied::Ignored);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "final");
    }

    #[test]
    fn done_without_tokens_has_no_content() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        match rec.apply(&mut transcript, &done(ResponseType::Error)) {
            Applied::Finalized { content, .. } => assert!(content.is_none()),
            other => unreachable!("expected finalized, got {other:?}"),
        }
        assert!(transcript.is_empty());
    }

    #[test]
    fn error_appends_separate_message() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        rec.apply(&mut transcript, &StreamEvent::token("partial"));
        let applied = rec.apply(&mut transcript, &StreamEvent::error("Error: upstream exploded"));

        assert!(matches!(applied, Applied::ErrorAppended { .. }));
        assert!(rec.saw_error());
        assert_eq!(transcript.len(), 2);
        // In-flight message is untouched.
        assert_eq!(transcript[0].content, "partial");
        assert!(transcript[0].is_streaming());
        assert_eq!(transcript[1].role, Role::Assistant);
        assert!(!transcript[1].is_streaming());
    }

    #[test]
    fn tokens_find_existing_message_by_id() {
        let mut transcript = vec![Message::streaming(StreamId::from("s1"), "pre")];
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        assert_eq!(rec.apply(&mut transcript, &StreamEvent::token("fix")), Applied::Extended);
        assert_eq!(transcript[0].content, "prefix");
    }

    #[test]
    fn abort_freezes_partial_and_appends_error() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        rec.apply(&mut transcript, &StreamEvent::token("half an ans"));
        rec.abort(&mut transcript, "stream read failed: connection reset");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "half an ans");
        assert!(!transcript[0].is_streaming());
        assert!(transcript.iter().all(|m| !m.is_streaming()));
        assert!(rec.is_finalized());
    }

    #[test]
    fn freeze_keeps_partial_without_new_message() {
        let mut transcript = Vec::new();
        let mut rec = MessageReconciler::new(StreamId::from("s1"));
        rec.apply(&mut transcript, &StreamEvent::token("partial"));
        rec.apply(&mut transcript, &StreamEvent::error("model crashed"));
        rec.freeze(&mut transcript);

        assert_eq!(transcript.len(), 2);
        assert!(transcript.iter().all(|m| !m.is_streaming()));
    }
}
