//! The shared text input buffer.
//!
//! Typing and dictation both write here; the chat reads and clears it on
//! submit. Only one writer is active at a time because a turn stops
//! dictation before it takes the text.

use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable handle to one text buffer.
#[derive(Debug, Clone, Default)]
pub struct InputSlot {
    text: Arc<Mutex<String>>,
}

impl InputSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut String) -> R) -> R {
        let mut guard = self.text.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Replace the contents.
    pub fn set(&self, text: impl Into<String>) {
        let text = text.into();
        self.with(|t| *t = text);
    }

    /// Copy of the contents.
    pub fn get(&self) -> String {
        self.with(|t| t.clone())
    }

    /// Take the contents, leaving the slot empty.
    pub fn take(&self) -> String {
        self.with(std::mem::take)
    }

    /// Whether the slot holds only whitespace.
    pub fn is_blank(&self) -> bool {
        self.with(|t| t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_buffer() {
        let slot = InputSlot::new();
        let typed = slot.clone();
        typed.set("What is a join?");
        assert_eq!(slot.get(), "What is a join?");
        assert_eq!(slot.take(), "What is a join?");
        assert!(typed.is_blank());
    }
}
