//! Conversation state and turn orchestration.
//!
//! - [`message`]: transcript entries and stream ids
//! - [`reconciler`]: merges one turn's events into the transcript
//! - [`cache`]: session-scoped duplicate-answer cache
//! - [`rate_limit`]: rate-limit heuristics and the sticky notice
//! - [`hints`]: the per-question hint ladder
//! - [`updates`]: UI-facing [`ChatUpdate`]s
//! - [`orchestrator`]: [`LectureChat`], one lecture's conversation

pub mod cache;
pub mod hints;
pub mod message;
pub mod orchestrator;
pub mod rate_limit;
pub mod reconciler;
pub mod updates;

pub use cache::{AnswerCache, normalize_question};
pub use hints::{HintEligibility, HintLadder, MAX_STAGE, MIN_STAGE};
pub use message::{Message, Role, StreamId};
pub use orchestrator::{LectureChat, LectureContext, TurnOutcome};
pub use rate_limit::{
    CREDENTIAL_MESSAGE, ErrorClass, RATE_LIMIT_MESSAGE, RATE_LIMIT_NOTICE, RateLimitMonitor,
    classify_error, classify_error_text, friendly_error_message, friendly_message_for,
};
pub use reconciler::{Applied, MessageReconciler};
pub use updates::ChatUpdate;
