//! Introduction Coordinator
//!
//! Transition table:
//!
//! | from                   | event                                  | to                     |
//! |------------------------|----------------------------------------|------------------------|
//! | `pending`              | request, runtime minimally ready       | `running`              |
//! | `pending`              | request, runtime not minimally ready   | `waiting_runtime`      |
//! | `waiting_runtime`      | runtime minimally ready                | `waiting_start_motion` |
//! | `waiting_start_motion` | start motion complete                  | `running`              |
//! | `waiting_*`            | wait timeout                           | `running`              |
//! | `running`              | execution finished                     | `completed`            |
//!
//! Entering `running` arms a short launch timer; the stored payload is
//! handed out exactly once when it fires.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::timers::{TimerId, TimerScope, TimerTable, TimerTask};
use crate::types::{AuditEntry, AuditOutcome, IntroPayload, IntroductionState, RejectReason};
use crate::INTRO_AUDIT_CAPACITY;

/// Readiness as the coordinator needs to see it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadinessView {
    pub minimally_ready: bool,
    pub start_motion_completed: bool,
}

/// One-time introduction state machine
#[derive(Debug)]
pub struct IntroductionCoordinator {
    state: IntroductionState,
    pending: Option<IntroPayload>,
    last_accepted_ms: Option<u64>,
    audit: VecDeque<AuditEntry>,
    executions: u32,
    cooldown_ms: u64,
    launch_delay_ms: u64,
    wait_timeout_ms: u64,
    wait_timer: Option<TimerId>,
    timers: TimerScope,
}

impl IntroductionCoordinator {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: IntroductionState::Pending,
            pending: None,
            last_accepted_ms: None,
            audit: VecDeque::new(),
            executions: 0,
            cooldown_ms: config.intro_cooldown_ms,
            launch_delay_ms: config.intro_launch_delay_ms,
            wait_timeout_ms: config.pending_start_timeout_ms,
            wait_timer: None,
            timers: TimerScope::new("introduction"),
        }
    }

    /// Ask for the introduction. Every call lands in the audit log.
    pub fn request(
        &mut self,
        requester: &str,
        payload: IntroPayload,
        readiness: ReadinessView,
        now: u64,
        table: &mut TimerTable,
    ) -> AuditOutcome {
        let found = self.state;
        let outcome = match self.guard(now) {
            Some(reason) => AuditOutcome::Rejected(reason),
            None => AuditOutcome::Accepted,
        };
        self.record(requester, now, found, outcome);

        match outcome {
            AuditOutcome::Rejected(reason) => {
                info!(requester, state = %found, %reason, "introduction request rejected");
            }
            AuditOutcome::Accepted => {
                info!(requester, state = %found, "introduction request accepted");
                self.last_accepted_ms = Some(now);
                self.pending = Some(payload);
                if readiness.minimally_ready {
                    self.enter_running(now, table);
                } else {
                    self.state = IntroductionState::WaitingRuntime;
                    self.wait_timer = Some(self.timers.schedule(
                        table,
                        now,
                        self.wait_timeout_ms,
                        TimerTask::IntroWaitTimeout,
                    ));
                    // Readiness may already cover the next stage
                    self.on_readiness(readiness, now, table);
                }
            }
        }
        outcome
    }

    fn guard(&self, now: u64) -> Option<RejectReason> {
        if self.state == IntroductionState::Completed {
            return Some(RejectReason::AlreadyCompleted);
        }
        if self.state == IntroductionState::Running || self.state.is_waiting() {
            return Some(RejectReason::InProgress);
        }
        match self.last_accepted_ms {
            Some(last) if now.saturating_sub(last) < self.cooldown_ms => Some(RejectReason::Cooldown),
            _ => None,
        }
    }

    fn record(&mut self, requester: &str, now: u64, state: IntroductionState, outcome: AuditOutcome) {
        if self.audit.len() >= INTRO_AUDIT_CAPACITY {
            self.audit.pop_front();
        }
        self.audit.push_back(AuditEntry {
            requester: requester.to_string(),
            at_ms: now,
            recorded_at: Utc::now(),
            state,
            outcome,
        });
    }

    /// Advance waiting states after any readiness change
    pub fn on_readiness(&mut self, readiness: ReadinessView, now: u64, table: &mut TimerTable) {
        if self.state == IntroductionState::WaitingRuntime && readiness.minimally_ready {
            debug!("introduction: runtime ready, waiting for start motion");
            self.state = IntroductionState::WaitingStartMotion;
        }
        if self.state == IntroductionState::WaitingStartMotion
            && readiness.minimally_ready
            && readiness.start_motion_completed
        {
            self.enter_running(now, table);
        }
    }

    fn enter_running(&mut self, now: u64, table: &mut TimerTable) {
        if let Some(id) = self.wait_timer.take() {
            self.timers.cancel(table, id);
        }
        self.state = IntroductionState::Running;
        self.timers
            .schedule(table, now, self.launch_delay_ms, TimerTask::IntroLaunch);
        info!(delay_ms = self.launch_delay_ms, "introduction running");
    }

    /// Timer callback. `None` if not ours; `Some(None)` if nothing to launch.
    pub fn on_timer(
        &mut self,
        id: TimerId,
        task: &TimerTask,
        now: u64,
        table: &mut TimerTable,
    ) -> Option<Option<IntroPayload>> {
        if !self.timers.release(id) {
            return None;
        }
        match task {
            TimerTask::IntroWaitTimeout => {
                self.wait_timer = None;
                if self.state.is_waiting() {
                    warn!(state = %self.state, "introduction wait timed out, running anyway");
                    self.enter_running(now, table);
                }
                Some(None)
            }
            TimerTask::IntroLaunch => Some(self.launch()),
            _ => Some(None),
        }
    }

    fn launch(&mut self) -> Option<IntroPayload> {
        if self.state != IntroductionState::Running {
            return None;
        }
        let payload = self.pending.take()?;
        self.executions += 1;
        info!(executions = self.executions, "introduction launched");
        Some(payload)
    }

    /// Execution finished (turn ended or text rendered)
    pub fn complete(&mut self) {
        if self.state == IntroductionState::Running {
            self.state = IntroductionState::Completed;
            info!("introduction completed");
        }
    }

    /// Back to `pending` (test harness). The audit log is kept.
    pub fn reset(&mut self, table: &mut TimerTable) {
        self.timers.cancel_all(table);
        self.wait_timer = None;
        self.pending = None;
        self.state = IntroductionState::Pending;
        debug!("introduction reset");
    }

    pub fn teardown(&mut self, table: &mut TimerTable) {
        self.timers.cancel_all(table);
        self.wait_timer = None;
    }

    pub fn state(&self) -> IntroductionState {
        self.state
    }

    pub fn has_pending_payload(&self) -> bool {
        self.pending.is_some()
    }

    /// Payloads handed out so far
    pub fn executions(&self) -> u32 {
        self.executions
    }

    pub fn audit(&self) -> impl Iterator<Item = &AuditEntry> {
        self.audit.iter()
    }

    pub fn entries_for<'a>(&'a self, requester: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.audit.iter().filter(move |e| e.requester == requester)
    }
}
