//! UI-facing chat updates.

use super::message::StreamId;
use crate::stream::{Reference, ResponseType};

/// Events emitted by a lecture chat for display.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    /// A user message was appended and a turn began.
    TurnStarted {
        /// Submitted question text.
        question: String,
        /// Hint stage sent with the turn.
        hint_stage: u8,
    },
    /// Whether the "composing" indicator should show.
    Composing { active: bool },
    /// Answer text arrived for the in-flight message.
    Token {
        /// Turn the token belongs to.
        stream_id: StreamId,
        text: String,
    },
    /// The in-flight answer was finalized.
    Finalized {
        response_type: ResponseType,
        references: Vec<Reference>,
        /// Whether reference chips should be shown.
        show_references: bool,
    },
    /// An error message was appended to the transcript.
    ErrorMessage { text: String },
    /// A repeat question was answered from the session cache.
    CacheHit { question: String },
    /// The sticky rate-limit notice appeared or cleared.
    RateLimitNotice { visible: bool },
    /// The transcript changed; `len` is its new length.
    TranscriptChanged { len: usize },
}
