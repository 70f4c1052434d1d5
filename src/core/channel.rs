//! Outbound message channel to the embedded runtime
//!
//! Single ordered queue, single-flight delivery:
//! - success: next dequeue after the minimum spacing
//! - failure: handle invalidated, command back at the head, retry after backoff
//! - no handle: retry after the handle wait
//!
//! Individual commands are never dropped once queued.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::timers::{TimerId, TimerScope, TimerTable, TimerTask};
use crate::types::{CommandBody, OutboundCommand};

/// Send failure reported by a runtime endpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("runtime rejected message: {0}")]
    Rejected(String),

    #[error("runtime endpoint unavailable")]
    Unavailable,
}

/// The runtime's message-receiving endpoint
pub trait RuntimeEndpoint: Send {
    fn send_message(&mut self, object: &str, method: &str, payload: &str)
        -> Result<(), DeliveryError>;
}

/// Hosting page capability that hands out endpoints
pub trait RuntimeHost: Send {
    /// Returns `None` while the runtime has not loaded
    fn acquire(&mut self) -> Option<Box<dyn RuntimeEndpoint>>;
}

/// Ordered, rate-limited, retrying command queue
pub struct OutboundChannel {
    host: Box<dyn RuntimeHost>,
    /// Exclusively held, re-acquired on failure
    handle: Option<Box<dyn RuntimeEndpoint>>,
    queue: VecDeque<OutboundCommand>,
    /// A delivery attempt or its follow-up timer is outstanding
    sending: bool,
    next_sequence: u64,
    session_id: String,
    bridge_object: String,
    bridge_method: String,
    spacing_ms: u64,
    backoff_ms: u64,
    handle_wait_ms: u64,
    timers: TimerScope,
    delivered: u64,
    failures: u64,
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("has_handle", &self.handle.is_some())
            .field("queue", &self.queue.len())
            .field("sending", &self.sending)
            .field("next_sequence", &self.next_sequence)
            .field("delivered", &self.delivered)
            .field("failures", &self.failures)
            .finish()
    }
}

impl OutboundChannel {
    pub fn new(host: Box<dyn RuntimeHost>, config: &SyncConfig, session_id: impl Into<String>) -> Self {
        Self {
            host,
            handle: None,
            queue: VecDeque::new(),
            sending: false,
            next_sequence: 0,
            session_id: session_id.into(),
            bridge_object: config.bridge_object.clone(),
            bridge_method: config.bridge_method.clone(),
            spacing_ms: config.channel_min_spacing_ms,
            backoff_ms: config.channel_retry_backoff_ms,
            handle_wait_ms: config.channel_handle_wait_ms,
            timers: TimerScope::new("channel"),
            delivered: 0,
            failures: 0,
        }
    }

    /// Queue a command. False only if no handle could be acquired right now,
    /// in which case nothing is queued.
    pub fn enqueue(&mut self, body: CommandBody, now: u64, table: &mut TimerTable) -> bool {
        if !self.reacquire() {
            warn!(kind = ?body.kind, "no runtime handle, command not queued");
            return false;
        }

        let command = OutboundCommand::stamp(body, self.next_sequence, &self.session_id, now);
        self.next_sequence += 1;
        debug!(sequence = command.sequence, kind = ?command.kind, "command queued");
        self.queue.push_back(command);

        if !self.sending {
            self.pump(now, table);
        }
        true
    }

    /// Ensure a handle is held. Returns true if one is held afterwards.
    pub fn reacquire(&mut self) -> bool {
        if self.handle.is_some() {
            return true;
        }
        match self.host.acquire() {
            Some(handle) => {
                info!("runtime handle acquired");
                self.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Drop the handle (explicit runtime disconnect)
    pub fn invalidate(&mut self) {
        if self.handle.take().is_some() {
            info!("runtime handle invalidated");
        }
    }

    /// Timer callback. Returns false if the timer is not ours.
    pub fn on_timer(&mut self, id: TimerId, now: u64, table: &mut TimerTable) -> bool {
        if !self.timers.release(id) {
            return false;
        }
        self.sending = false;
        self.pump(now, table);
        true
    }

    /// One delivery attempt
    fn pump(&mut self, now: u64, table: &mut TimerTable) {
        if self.queue.is_empty() {
            self.sending = false;
            return;
        }
        self.sending = true;

        if !self.reacquire() {
            debug!(queued = self.queue.len(), "waiting for runtime handle");
            self.schedule(now, self.handle_wait_ms, table);
            return;
        }

        let Some(command) = self.queue.pop_front() else {
            self.sending = false;
            return;
        };
        let payload = command.to_payload();
        let result = match self.handle.as_mut() {
            Some(handle) => handle.send_message(&self.bridge_object, &self.bridge_method, &payload),
            None => Err(DeliveryError::Unavailable),
        };

        match result {
            Ok(()) => {
                self.delivered += 1;
                debug!(sequence = command.sequence, kind = ?command.kind, "command delivered");
                self.schedule(now, self.spacing_ms, table);
            }
            Err(e) => {
                self.failures += 1;
                warn!(sequence = command.sequence, error = %e, "delivery failed, requeued at head");
                self.handle = None;
                self.queue.push_front(command);
                self.schedule(now, self.backoff_ms, table);
            }
        }
    }

    fn schedule(&mut self, now: u64, delay_ms: u64, table: &mut TimerTable) {
        self.timers.schedule(table, now, delay_ms, TimerTask::ChannelPump);
    }

    /// Cancel pending pumps (page unload). Queued commands stay queued.
    pub fn teardown(&mut self, table: &mut TimerTable) {
        self.timers.cancel_all(table);
        self.sending = false;
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
