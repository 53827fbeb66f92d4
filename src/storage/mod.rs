//! Tab-scoped and durable storage.
//!
//! - [`kv`]: the [`KeyValueStore`] trait with [`MemoryStore`] and [`FileStore`]
//! - [`session`]: per-lecture transcript persistence
//! - [`preferences`]: remembered user settings

pub mod kv;
pub mod preferences;
pub mod session;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use preferences::{PREFERENCES_KEY, Preferences};
pub use session::{DEFAULT_MAX_MESSAGES, SessionStore, StoredMessage};
