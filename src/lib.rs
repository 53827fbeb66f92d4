//! Lecture tutor: streaming study-assistant client.
//!
//! Conducts chat turns about one lecture against a remote answer backend
//! over an incremental event stream, with voice dictation into the same
//! text input.
//!
//! # Architecture
//!
//! - **Stream decoding** ([`stream`]): raw bytes → `data:` lines → typed events
//! - **Backend access** ([`api`]): the [`AnswerBackend`] seam and its reqwest client
//! - **Conversation** ([`chat`]): reconciler, duplicate-answer cache,
//!   rate-limit monitor, hint ladder and the [`LectureChat`] orchestrator
//! - **Dictation** ([`dictation`]): Idle/Listening/Finalizing state machine
//!   driven on tokio, with audio leases released on every exit path
//! - **Storage** ([`storage`]): tab-scoped transcripts and durable preferences

pub mod api;
pub mod chat;
pub mod config;
pub mod dictation;
pub mod error;
pub mod input;
pub mod storage;
pub mod stream;

pub use api::{AnswerBackend, Attachment, TurnRequest, TutorClient};
pub use chat::{ChatUpdate, LectureChat, LectureContext, Message, TurnOutcome};
pub use config::{ResponseStyle, TeachingMode, TutorConfig};
pub use dictation::{DictationController, DictationDriver, DictationHandle};
pub use error::{Result, TutorError};
pub use input::InputSlot;
pub use storage::{FileStore, KeyValueStore, MemoryStore, Preferences, SessionStore};
pub use stream::{DonePayload, Reference, ResponseType, StreamEvent};
