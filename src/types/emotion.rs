//! Last emotion instruction believed to have reached the runtime

use serde::{Deserialize, Serialize};

use crate::NEUTRAL_EMOTION;

/// Recorded emotion state (not necessarily confirmed by the runtime)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionState {
    pub emotion: String,
    pub talking: bool,
    /// Clock milliseconds of the last delivered change, `None` before the first
    pub last_change_ms: Option<u64>,
}

impl Default for EmotionState {
    fn default() -> Self {
        Self {
            emotion: NEUTRAL_EMOTION.to_string(),
            talking: false,
            last_change_ms: None,
        }
    }
}

impl EmotionState {
    /// Neutral and silent
    pub fn is_neutral(&self) -> bool {
        self.emotion == NEUTRAL_EMOTION && !self.talking
    }

    /// Same `(emotion, talking)` pair
    pub fn matches(&self, emotion: &str, talking: bool) -> bool {
        self.emotion == emotion && self.talking == talking
    }
}
