//! Hint ladder: per-question escalation stage for guided answers.
//!
//! Stage 1 is a nudge, stage 2 a stronger hint, stage 3 the full answer.
//! Stages never go down except through [`HintLadder::reset`].

use std::collections::HashMap;

use tracing::debug;

use super::cache::normalize_question;

/// First (default) stage.
pub const MIN_STAGE: u8 = 1;
/// Final stage: the full answer.
pub const MAX_STAGE: u8 = 3;

/// Per-question hint stages.
#[derive(Debug, Default, Clone)]
pub struct HintLadder {
    stages: HashMap<String, u8>,
}

impl HintLadder {
    /// Create a ladder with every question at stage 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage for `question` (1 when never escalated).
    pub fn stage(&self, question: &str) -> u8 {
        self.stages
            .get(&normalize_question(question))
            .copied()
            .unwrap_or(MIN_STAGE)
    }

    /// Move `question` one stage up, saturating at 3. Returns the new stage.
    pub fn advance(&mut self, question: &str) -> u8 {
        let key = normalize_question(question);
        let stage = self.stages.entry(key.clone()).or_insert(MIN_STAGE);
        if *stage < MAX_STAGE {
            *stage += 1;
            debug!(question = %key, stage = *stage, "hint ladder advanced");
        }
        *stage
    }

    /// Jump `question` straight to the full answer. Returns 3.
    pub fn reveal(&mut self, question: &str) -> u8 {
        let key = normalize_question(question);
        debug!(question = %key, "hint ladder revealed");
        self.stages.insert(key, MAX_STAGE);
        MAX_STAGE
    }

    /// Raise `question` to a stage seen earlier, e.g. in a restored
    /// transcript. Never lowers a stage.
    pub fn restore(&mut self, question: &str, stage: u8) {
        let stage = stage.clamp(MIN_STAGE, MAX_STAGE);
        let entry = self
            .stages
            .entry(normalize_question(question))
            .or_insert(MIN_STAGE);
        *entry = (*entry).max(stage);
    }

    /// Forget every escalation.
    pub fn reset(&mut self) {
        self.stages.clear();
    }
}

/// Inputs to the hint-control visibility rule.
#[derive(Debug, Clone, Copy)]
pub struct HintEligibility {
    /// Guided mode is active.
    pub teaching_mode: bool,
    /// The newest message is a finalized assistant answer.
    pub last_is_finalized_assistant: bool,
    /// Stage of the newest user message.
    pub last_user_stage: Option<u8>,
    /// A turn is in flight.
    pub busy: bool,
}

impl HintEligibility {
    /// Whether the advance/reveal controls should be offered.
    pub fn controls_visible(&self) -> bool {
        self.teaching_mode
            && self.last_is_finalized_assistant
            && self.last_user_stage.is_some_and(|s| s < MAX_STAGE)
            && !self.busy
    }
}
