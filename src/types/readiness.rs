//! Embedded runtime readiness model

use serde::{Deserialize, Serialize};

/// Transport connection status as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Processing,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Processing => "PROCESSING",
            ConnectionStatus::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Runtime startup progress.
///
/// Invariant: `start_motion_completed => fully_initialized => instance_acquired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessState {
    pub instance_acquired: bool,
    pub fully_initialized: bool,
    pub start_motion_completed: bool,
    pub connection_status: ConnectionStatus,
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self {
            instance_acquired: false,
            fully_initialized: false,
            start_motion_completed: false,
            connection_status: ConnectionStatus::Disconnected,
        }
    }
}

impl ReadinessState {
    /// Check the stage ordering invariant
    pub fn is_consistent(&self) -> bool {
        (!self.start_motion_completed || self.fully_initialized)
            && (!self.fully_initialized || self.instance_acquired)
    }
}

/// One observed readiness change, reported exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessTransition {
    InstanceAcquired,
    FullyInitialized,
    StartMotionCompleted,
    AudioInitialized,
    ConnectionChanged(ConnectionStatus),
    Disconnected,
}
