//! User preferences in durable storage.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::kv::KeyValueStore;
use crate::config::{ResponseStyle, TeachingMode};
use crate::error::TutorError;

/// Storage key for the preferences record.
pub const PREFERENCES_KEY: &str = "preferences";

/// Settings remembered across sessions.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    /// Backend credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Preferred answer mode.
    pub teaching_mode: TeachingMode,
    /// Preferred tone.
    pub response_style: ResponseStyle,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("teaching_mode", &self.teaching_mode)
            .field("response_style", &self.response_style)
            .finish()
    }
}

impl Preferences {
    /// Load from `store`, falling back to defaults when absent or unreadable.
    pub async fn load<K: KeyValueStore + ?Sized>(store: &K) -> Self {
        match store.get(PREFERENCES_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("ignoring unreadable preferences: {e}");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("failed to read preferences: {e}");
                Self::default()
            }
        }
    }

    /// Write to `store`.
    pub async fn save<K: KeyValueStore + ?Sized>(&self, store: &K) -> Result<(), TutorError> {
        let json = serde_json::to_string(self)
            .map_err(|e| TutorError::Storage(format!("failed to serialize preferences: {e}")))?;
        store.set(PREFERENCES_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::storage::kv::{FileStore, MemoryStore};

    #[tokio::test]
    async fn missing_preferences_are_defaults() {
        let prefs = Preferences::load(&MemoryStore::new()).await;
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.teaching_mode, TeachingMode::Fix);
    }

    #[tokio::test]
    async fn preferences_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences {
            api_key: Some("gsk_test".into()),
            teaching_mode: TeachingMode::Teach,
            response_style: ResponseStyle::Direct,
        };
        prefs.save(&FileStore::new(dir.path()).unwrap()).await.unwrap();

        let reopened = FileStore::new(dir.path()).unwrap();
        assert_eq!(Preferences::load(&reopened).await, prefs);
    }

    #[tokio::test]
    async fn garbage_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(PREFERENCES_KEY, "{{{").await.unwrap();
        assert_eq!(Preferences::load(&store).await, Preferences::default());
    }

    #[test]
    fn debug_redacts_key() {
        let prefs = Preferences {
            api_key: Some("gsk_secret".into()),
            ..Preferences::default()
        };
        assert!(!format!("{prefs:?}").contains("gsk_secret"));
    }
}
