//! Timing configuration
//!
//! Every component reads its intervals from `SyncConfig`. Defaults are the
//! crate-level constants; a JSON file may override any subset of fields.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::*;

/// Configuration load failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// All timing knobs of the synchronization core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub runtime_poll_interval_ms: u64,
    pub runtime_acquire_max_attempts: u32,
    pub status_check_interval_ms: u64,
    pub status_check_max: u32,
    pub start_motion_fallback_ms: u64,

    pub channel_min_spacing_ms: u64,
    pub channel_retry_backoff_ms: u64,
    pub channel_handle_wait_ms: u64,
    pub bridge_object: String,
    pub bridge_method: String,

    pub emotion_debounce_ms: u64,
    pub text_turn_fallback_ms: u64,
    pub audio_safety_buffer_ms: u64,
    pub audio_safety_floor_ms: u64,
    pub audio_error_grace_ms: u64,
    pub neutral_confirm_first_ms: u64,
    pub neutral_confirm_second_ms: u64,

    pub intro_cooldown_ms: u64,
    pub intro_launch_delay_ms: u64,
    pub pending_start_timeout_ms: u64,

    pub visitor_info_delay_ms: u64,
    pub quiz_explanation_delay_ms: u64,
    pub quiz_follow_up_min_ms: u64,
    pub quiz_follow_up_slack_ms: u64,
    pub quiz_proposal_request_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            runtime_poll_interval_ms: RUNTIME_POLL_INTERVAL_MS,
            runtime_acquire_max_attempts: RUNTIME_ACQUIRE_MAX_ATTEMPTS,
            status_check_interval_ms: STATUS_CHECK_INTERVAL_MS,
            status_check_max: STATUS_CHECK_MAX,
            start_motion_fallback_ms: START_MOTION_FALLBACK_MS,
            channel_min_spacing_ms: CHANNEL_MIN_SPACING_MS,
            channel_retry_backoff_ms: CHANNEL_RETRY_BACKOFF_MS,
            channel_handle_wait_ms: CHANNEL_HANDLE_WAIT_MS,
            bridge_object: BRIDGE_OBJECT.to_string(),
            bridge_method: BRIDGE_METHOD.to_string(),
            emotion_debounce_ms: EMOTION_DEBOUNCE_MS,
            text_turn_fallback_ms: TEXT_TURN_FALLBACK_MS,
            audio_safety_buffer_ms: AUDIO_SAFETY_BUFFER_MS,
            audio_safety_floor_ms: AUDIO_SAFETY_FLOOR_MS,
            audio_error_grace_ms: AUDIO_ERROR_GRACE_MS,
            neutral_confirm_first_ms: NEUTRAL_CONFIRM_FIRST_MS,
            neutral_confirm_second_ms: NEUTRAL_CONFIRM_SECOND_MS,
            intro_cooldown_ms: INTRO_COOLDOWN_MS,
            intro_launch_delay_ms: INTRO_LAUNCH_DELAY_MS,
            pending_start_timeout_ms: PENDING_START_TIMEOUT_MS,
            visitor_info_delay_ms: VISITOR_INFO_DELAY_MS,
            quiz_explanation_delay_ms: QUIZ_EXPLANATION_DELAY_MS,
            quiz_follow_up_min_ms: QUIZ_FOLLOW_UP_MIN_MS,
            quiz_follow_up_slack_ms: QUIZ_FOLLOW_UP_SLACK_MS,
            quiz_proposal_request_delay_ms: QUIZ_PROPOSAL_REQUEST_DELAY_MS,
        }
    }
}

impl SyncConfig {
    /// Parse a (possibly partial) JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Safety timer for a clip of the given estimated duration
    pub fn audio_safety_timeout_ms(&self, estimated_ms: u64) -> u64 {
        (estimated_ms + self.audio_safety_buffer_ms).max(self.audio_safety_floor_ms)
    }

    /// Wait between a quiz answer result and the follow-up request
    pub fn quiz_follow_up_ms(&self, audio_ms: Option<u64>) -> u64 {
        match audio_ms {
            Some(ms) => (ms + self.quiz_follow_up_slack_ms).max(self.quiz_follow_up_min_ms),
            None => self.quiz_follow_up_min_ms,
        }
    }
}
