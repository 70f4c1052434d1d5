//! Runtime Readiness Tracker
//!
//! Stage progression:
//! - instance acquired (polled through the channel's host)
//! - fully initialized (runtime signal, or status-check watchdog expiry)
//! - start motion completed (runtime signal, or fallback after initialization)
//!
//! Later stages imply earlier ones: an out-of-order signal clamps progress
//! forward. Regressions are ignored except an explicit disconnect. Every
//! `mark_*` returns the transitions that actually happened, so each one is
//! dispatched exactly once.

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::channel::OutboundChannel;
use crate::core::timers::{TimerId, TimerScope, TimerTable, TimerTask};
use crate::types::{CommandBody, ConnectionStatus, ReadinessState, ReadinessTransition};

/// Readiness tracker
#[derive(Debug)]
pub struct ReadinessTracker {
    state: ReadinessState,
    audio_initialized: bool,
    acquire_attempts: u32,
    max_attempts: u32,
    poll_interval_ms: u64,
    status_check_interval_ms: u64,
    status_check_max: u32,
    status_checks_sent: u32,
    start_motion_fallback_ms: u64,
    fallback: Option<TimerId>,
    timers: TimerScope,
}

impl ReadinessTracker {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: ReadinessState::default(),
            audio_initialized: false,
            acquire_attempts: 0,
            max_attempts: config.runtime_acquire_max_attempts,
            poll_interval_ms: config.runtime_poll_interval_ms,
            status_check_interval_ms: config.status_check_interval_ms,
            status_check_max: config.status_check_max,
            status_checks_sent: 0,
            start_motion_fallback_ms: config.start_motion_fallback_ms,
            fallback: None,
            timers: TimerScope::new("readiness"),
        }
    }

    /// Begin periodic acquisition polling
    pub fn start_polling(&mut self, now: u64, table: &mut TimerTable) {
        self.timers
            .schedule(table, now, self.poll_interval_ms, TimerTask::ReadinessPoll);
    }

    // =========================================================================
    // PREDICATES
    // =========================================================================

    /// Every stage done, connected, and local audio usable
    pub fn is_fully_ready(&self) -> bool {
        self.is_minimally_ready() && self.state.start_motion_completed
    }

    /// Like `is_fully_ready` without the start-motion stage
    pub fn is_minimally_ready(&self) -> bool {
        self.state.instance_acquired
            && self.state.fully_initialized
            && self.state.connection_status == ConnectionStatus::Connected
            && self.audio_initialized
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    pub fn audio_initialized(&self) -> bool {
        self.audio_initialized
    }

    pub fn acquire_attempts(&self) -> u32 {
        self.acquire_attempts
    }

    pub fn status_checks_sent(&self) -> u32 {
        self.status_checks_sent
    }

    // =========================================================================
    // STAGES
    // =========================================================================

    pub fn mark_instance_acquired(&mut self) -> Vec<ReadinessTransition> {
        let mut transitions = Vec::new();
        if !self.state.instance_acquired {
            self.state.instance_acquired = true;
            info!("runtime instance acquired");
            transitions.push(ReadinessTransition::InstanceAcquired);
        }
        transitions
    }

    pub fn mark_fully_initialized(&mut self, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        let mut transitions = self.mark_instance_acquired();
        if !self.state.fully_initialized {
            self.state.fully_initialized = true;
            info!("runtime fully initialized");
            transitions.push(ReadinessTransition::FullyInitialized);
            if !self.state.start_motion_completed {
                self.fallback = Some(self.timers.schedule(
                    table,
                    now,
                    self.start_motion_fallback_ms,
                    TimerTask::StartMotionFallback,
                ));
            }
        } else {
            debug!("duplicate fully-initialized signal ignored");
        }
        transitions
    }

    pub fn mark_start_motion_complete(&mut self, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        if self.state.start_motion_completed {
            debug!("duplicate start-motion signal ignored");
            return Vec::new();
        }
        if !self.state.fully_initialized {
            debug!("start motion reported before initialization, clamping forward");
        }

        // Set first so the earlier stage arms no fallback
        self.state.start_motion_completed = true;
        let mut transitions = self.mark_fully_initialized(now, table);
        if let Some(id) = self.fallback.take() {
            self.timers.cancel(table, id);
        }
        info!("start motion completed");
        transitions.push(ReadinessTransition::StartMotionCompleted);
        transitions
    }

    pub fn mark_audio_initialized(&mut self) -> Vec<ReadinessTransition> {
        if self.audio_initialized {
            return Vec::new();
        }
        self.audio_initialized = true;
        info!("local audio initialized");
        vec![ReadinessTransition::AudioInitialized]
    }

    pub fn set_connection_status(&mut self, status: ConnectionStatus) -> Vec<ReadinessTransition> {
        if self.state.connection_status == status {
            return Vec::new();
        }
        info!(from = %self.state.connection_status, to = %status, "connection status changed");
        self.state.connection_status = status;
        vec![ReadinessTransition::ConnectionChanged(status)]
    }

    /// Explicit runtime teardown: the only regression accepted
    pub fn mark_disconnected(&mut self, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        let was_acquired = self.state.instance_acquired;
        self.state.instance_acquired = false;
        self.state.fully_initialized = false;
        self.state.start_motion_completed = false;
        self.status_checks_sent = 0;
        self.acquire_attempts = 0;

        self.fallback = None;
        self.timers.cancel_all(table);
        self.start_polling(now, table);
        if was_acquired {
            warn!("runtime disconnected");
            vec![ReadinessTransition::Disconnected]
        } else {
            Vec::new()
        }
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    /// Try to obtain a handle now (poll tick or runtime "ready" notice)
    pub fn try_acquire(
        &mut self,
        channel: &mut OutboundChannel,
        now: u64,
        table: &mut TimerTable,
    ) -> Vec<ReadinessTransition> {
        if channel.has_handle() || channel.reacquire() {
            self.acquire_attempts = 0;
            return self.on_handle_present(now, table);
        }
        Vec::new()
    }

    fn on_handle_present(&mut self, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        let transitions = self.mark_instance_acquired();
        if !transitions.is_empty() && !self.state.fully_initialized {
            self.status_checks_sent = 0;
            self.timers
                .schedule(table, now, self.status_check_interval_ms, TimerTask::StatusCheck);
        }
        transitions
    }

    fn poll(&mut self, channel: &mut OutboundChannel, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        let transitions = if channel.has_handle() {
            self.acquire_attempts = 0;
            self.on_handle_present(now, table)
        } else if self.acquire_attempts >= self.max_attempts {
            warn!(attempts = self.acquire_attempts, "runtime acquisition budget spent, restarting");
            self.acquire_attempts = 0;
            Vec::new()
        } else {
            self.acquire_attempts += 1;
            debug!(attempt = self.acquire_attempts, "polling for runtime handle");
            self.try_acquire(channel, now, table)
        };
        self.start_polling(now, table);
        transitions
    }

    fn status_check(&mut self, channel: &mut OutboundChannel, now: u64, table: &mut TimerTable) -> Vec<ReadinessTransition> {
        if self.state.fully_initialized {
            return Vec::new();
        }
        self.status_checks_sent += 1;
        channel.enqueue(CommandBody::status_check(), now, table);

        if self.status_checks_sent >= self.status_check_max {
            warn!(checks = self.status_checks_sent, "runtime never reported initialization, assuming ready");
            return self.mark_start_motion_complete(now, table);
        }
        self.timers
            .schedule(table, now, self.status_check_interval_ms, TimerTask::StatusCheck);
        Vec::new()
    }

    /// Timer callback. `None` if the timer is not ours.
    pub fn on_timer(
        &mut self,
        id: TimerId,
        task: &TimerTask,
        channel: &mut OutboundChannel,
        now: u64,
        table: &mut TimerTable,
    ) -> Option<Vec<ReadinessTransition>> {
        if !self.timers.release(id) {
            return None;
        }
        let transitions = match task {
            TimerTask::ReadinessPoll => self.poll(channel, now, table),
            TimerTask::StatusCheck => self.status_check(channel, now, table),
            TimerTask::StartMotionFallback => {
                self.fallback = None;
                if self.state.start_motion_completed {
                    Vec::new()
                } else {
                    warn!("no start-motion signal, assuming complete");
                    self.mark_start_motion_complete(now, table)
                }
            }
            _ => Vec::new(),
        };
        Some(transitions)
    }

    /// Cancel every tracker timer (page unload)
    pub fn teardown(&mut self, table: &mut TimerTable) {
        self.fallback = None;
        self.timers.cancel_all(table);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
