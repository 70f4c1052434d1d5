//! Status snapshot for terminal display and the HTTP bridge

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::types::{AuditEntry, EmotionState, IntroductionState, ReadinessState};

/// Point-in-time view of the whole core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Clock milliseconds
    pub now_ms: u64,
    pub readiness: ReadinessState,
    pub audio_initialized: bool,
    pub minimally_ready: bool,
    pub fully_ready: bool,
    pub introduction: IntroductionState,
    pub emotion: EmotionState,
    pub active_turn: Option<String>,
    pub active_turn_timers: usize,
    pub pending_start: bool,
    pub queue_depth: usize,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub scheduled_timers: usize,
    pub relationship_level: u8,
    /// Introduction start requests, oldest first
    #[serde(default)]
    pub intro_audit: Vec<AuditEntry>,
}

impl StatusSnapshot {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let ready = if self.fully_ready {
            "READY".green().bold()
        } else if self.minimally_ready {
            "MINIMAL".yellow()
        } else {
            "NOT READY".red()
        };
        let emotion = if self.emotion.is_neutral() {
            self.emotion.emotion.normal()
        } else {
            self.emotion.emotion.cyan()
        };
        format!(
            "{} | intro={} | emotion={} talking={} | turn={} | queue={} | delivered={} failed={}",
            ready,
            self.introduction,
            emotion,
            self.emotion.talking,
            self.active_turn.as_deref().unwrap_or("-"),
            self.queue_depth,
            self.delivered,
            self.delivery_failures,
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "ready={} | intro={} | emotion={} | talking={} | turn={} | queue={} | delivered={} | failed={}",
            self.fully_ready,
            self.introduction,
            self.emotion.emotion,
            self.emotion.talking,
            self.active_turn.as_deref().unwrap_or("-"),
            self.queue_depth,
            self.delivered,
            self.delivery_failures,
        )
    }
}
