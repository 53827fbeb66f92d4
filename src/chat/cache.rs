//! Session-scoped duplicate-answer cache.
//!
//! Keys are the question text lowercased and trimmed. Near-duplicate
//! phrasings are distinct keys. Entries live as long as the chat session;
//! there is no eviction.

use std::collections::HashMap;

use tracing::debug;

/// Normalize question text for cache and hint-ladder keys.
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Map of normalized question → last finalized answer.
#[derive(Debug, Default, Clone)]
pub struct AnswerCache {
    entries: HashMap<String, String>,
}

impl AnswerCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer for `question`, unless the turn carries an attachment.
    pub fn lookup(&self, question: &str, has_attachment: bool) -> Option<&str> {
        if has_attachment {
            return None;
        }
        self.entries.get(&normalize_question(question)).map(String::as_str)
    }

    /// Remember the answer to `question`.
    ///
    /// Callers record only successful, attachment-free completions; empty
    /// answers are not stored.
    pub fn record(&mut self, question: &str, answer: &str) {
        if answer.is_empty() {
            return;
        }
        let key = normalize_question(question);
        debug!(question = %key, "caching answer ({} chars)", answer.len());
        self.entries.insert(key, answer.to_owned());
    }

    /// Number of cached questions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
