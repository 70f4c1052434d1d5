//! Introduction state machine types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Introduction lifecycle. `Completed` is terminal for the page lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntroductionState {
    Pending,
    WaitingRuntime,
    WaitingStartMotion,
    Running,
    Completed,
}

impl IntroductionState {
    /// Waiting on the runtime in either stage
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingRuntime | Self::WaitingStartMotion)
    }
}

impl std::fmt::Display for IntroductionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntroductionState::Pending => "pending",
            IntroductionState::WaitingRuntime => "waiting_runtime",
            IntroductionState::WaitingStartMotion => "waiting_start_motion",
            IntroductionState::Running => "running",
            IntroductionState::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

/// What the introduction renders and speaks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroPayload {
    pub message: String,
    pub emotion: String,
    pub audio: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Why a start request was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyCompleted,
    InProgress,
    Cooldown,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::AlreadyCompleted => "already completed",
            RejectReason::InProgress => "running or waiting",
            RejectReason::Cooldown => "within cooldown",
        };
        write!(f, "{}", text)
    }
}

/// Outcome recorded for a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// One start request, for diagnosing races between readiness sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub requester: String,
    /// Clock milliseconds of the request
    pub at_ms: u64,
    /// Wall time of the request
    pub recorded_at: DateTime<Utc>,
    /// State the request found
    pub state: IntroductionState,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn is_accepted(&self) -> bool {
        self.outcome == AuditOutcome::Accepted
    }
}
