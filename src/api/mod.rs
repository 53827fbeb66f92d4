//! Answer backend access: wire types, the backend trait and the HTTP client.

pub mod backend;
pub mod client;
pub mod types;

pub use backend::AnswerBackend;
pub use client::TutorClient;
pub use types::{
    Attachment, BackendHealth, FallbackReply, HistoryEntry, KeyVerification, TurnRequest,
};
