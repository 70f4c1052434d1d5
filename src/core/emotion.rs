//! Emotion Synchronizer
//!
//! Filters emotion pushes before they reach the outbound channel:
//! 1. boundary reasons are delivered unconditionally
//! 2. anything within the debounce window of the last delivery is rejected
//! 3. an unchanged `(emotion, talking)` is rejected unless force-override
//! 4. otherwise delivered, and the recorded state updated

use tracing::debug;

use crate::config::SyncConfig;
use crate::core::channel::OutboundChannel;
use crate::core::timers::TimerTable;
use crate::types::{CommandBody, EmotionReason, EmotionState};

/// Borrowed path to the runtime at a point in time
pub struct Link<'a> {
    pub channel: &'a mut OutboundChannel,
    pub timers: &'a mut TimerTable,
    pub now: u64,
}

impl<'a> Link<'a> {
    pub fn new(channel: &'a mut OutboundChannel, timers: &'a mut TimerTable, now: u64) -> Self {
        Self { channel, timers, now }
    }

    /// Hand a command to the channel
    pub fn send(&mut self, body: CommandBody) -> bool {
        self.channel.enqueue(body, self.now, self.timers)
    }
}

/// Why a push was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushRejection {
    Debounced,
    Unchanged,
    ChannelUnavailable,
}

/// Owner of the recorded emotion state
#[derive(Debug)]
pub struct EmotionSynchronizer {
    state: EmotionState,
    debounce_ms: u64,
    delivered: u64,
    rejected: u64,
}

impl EmotionSynchronizer {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: EmotionState::default(),
            debounce_ms: config.emotion_debounce_ms,
            delivered: 0,
            rejected: 0,
        }
    }

    /// Request an emotion change. True if it was handed to the channel.
    pub fn push(
        &mut self,
        link: &mut Link<'_>,
        emotion: &str,
        talking: bool,
        reason: EmotionReason,
        conversation_id: Option<&str>,
    ) -> bool {
        match self.try_push(link, emotion, talking, reason, conversation_id) {
            Ok(()) => true,
            Err(rejection) => {
                self.rejected += 1;
                debug!(emotion, talking, reason = %reason, ?rejection, "emotion push rejected");
                false
            }
        }
    }

    fn try_push(
        &mut self,
        link: &mut Link<'_>,
        emotion: &str,
        talking: bool,
        reason: EmotionReason,
        conversation_id: Option<&str>,
    ) -> Result<(), PushRejection> {
        if !reason.is_boundary() {
            if let Some(last) = self.state.last_change_ms {
                if link.now.saturating_sub(last) < self.debounce_ms {
                    return Err(PushRejection::Debounced);
                }
            }
            if self.state.matches(emotion, talking) && !reason.is_force_override() {
                return Err(PushRejection::Unchanged);
            }
        }

        let body = CommandBody::emotion(
            emotion,
            talking,
            reason,
            conversation_id.map(str::to_string),
        );
        if !link.send(body) {
            return Err(PushRejection::ChannelUnavailable);
        }

        self.state = EmotionState {
            emotion: emotion.to_string(),
            talking,
            last_change_ms: Some(link.now),
        };
        self.delivered += 1;
        debug!(emotion, talking, reason = %reason, "emotion pushed");
        Ok(())
    }

    pub fn state(&self) -> &EmotionState {
        &self.state
    }

    pub fn is_neutral(&self) -> bool {
        self.state.is_neutral()
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}
