//! In-process stand-ins for the embedded runtime and the audio element
//!
//! Used by script replay, the HTTP bridge's audio side and the tests. Both
//! are cheap clones over shared state so a caller can keep one copy for
//! inspection while the core owns another.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::audio::{AudioClip, AudioError, AudioSink};
use crate::core::channel::{DeliveryError, RuntimeEndpoint, RuntimeHost};
use crate::types::{AudioHandle, CommandKind, OutboundCommand};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// RUNTIME
// =============================================================================

/// One call to `send_message`
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub object: String,
    pub method: String,
    pub payload: String,
    pub delivered: bool,
}

impl DeliveryAttempt {
    pub fn command(&self) -> Option<OutboundCommand> {
        OutboundCommand::from_payload(&self.payload)
    }
}

#[derive(Debug, Default)]
struct RuntimeLog {
    available: bool,
    fail_next: u32,
    acquisitions: u32,
    attempts: Vec<DeliveryAttempt>,
}

/// Scriptable embedded runtime
#[derive(Debug, Clone)]
pub struct SimulatedRuntime {
    inner: Arc<Mutex<RuntimeLog>>,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRuntime {
    /// Loaded and accepting messages
    pub fn new() -> Self {
        let runtime = Self::unavailable();
        runtime.set_available(true);
        runtime
    }

    /// Not loaded yet
    pub fn unavailable() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RuntimeLog::default())),
        }
    }

    /// Boxed host sharing this runtime's state
    pub fn host(&self) -> Box<dyn RuntimeHost> {
        Box::new(self.clone())
    }

    pub fn set_available(&self, available: bool) {
        lock(&self.inner).available = available;
    }

    /// Make the next `count` sends fail
    pub fn fail_next(&self, count: u32) {
        lock(&self.inner).fail_next = count;
    }

    pub fn acquisitions(&self) -> u32 {
        lock(&self.inner).acquisitions
    }

    /// Every send attempt, failed ones included
    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        lock(&self.inner).attempts.clone()
    }

    /// Successfully delivered commands, in delivery order
    pub fn delivered(&self) -> Vec<OutboundCommand> {
        lock(&self.inner)
            .attempts
            .iter()
            .filter(|a| a.delivered)
            .filter_map(|a| a.command())
            .collect()
    }

    /// Delivered emotion commands only
    pub fn emotion_commands(&self) -> Vec<OutboundCommand> {
        self.delivered()
            .into_iter()
            .filter(|c| c.kind == CommandKind::Emotion)
            .collect()
    }
}

impl RuntimeHost for SimulatedRuntime {
    fn acquire(&mut self) -> Option<Box<dyn RuntimeEndpoint>> {
        let mut log = lock(&self.inner);
        if !log.available {
            return None;
        }
        log.acquisitions += 1;
        Some(Box::new(SimulatedEndpoint {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct SimulatedEndpoint {
    inner: Arc<Mutex<RuntimeLog>>,
}

impl RuntimeEndpoint for SimulatedEndpoint {
    fn send_message(&mut self, object: &str, method: &str, payload: &str) -> Result<(), DeliveryError> {
        let mut log = lock(&self.inner);
        let result = if !log.available {
            Err(DeliveryError::Unavailable)
        } else if log.fail_next > 0 {
            log.fail_next -= 1;
            Err(DeliveryError::Rejected("simulated failure".to_string()))
        } else {
            Ok(())
        };
        log.attempts.push(DeliveryAttempt {
            object: object.to_string(),
            method: method.to_string(),
            payload: payload.to_string(),
            delivered: result.is_ok(),
        });
        result
    }
}

// =============================================================================
// AUDIO
// =============================================================================

#[derive(Debug, Default)]
struct AudioLog {
    next_handle: u64,
    refuse_next: bool,
    plays: Vec<(AudioHandle, AudioClip)>,
    stops: Vec<AudioHandle>,
}

/// Audio element stand-in; completion is reported by the caller
#[derive(Debug, Clone, Default)]
pub struct SimulatedAudio {
    inner: Arc<Mutex<AudioLog>>,
}

impl SimulatedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Box<dyn AudioSink> {
        Box::new(self.clone())
    }

    /// Make the next `play` fail (autoplay refused)
    pub fn refuse_next_play(&self) {
        lock(&self.inner).refuse_next = true;
    }

    pub fn plays(&self) -> Vec<(AudioHandle, AudioClip)> {
        lock(&self.inner).plays.clone()
    }

    pub fn last_handle(&self) -> Option<AudioHandle> {
        lock(&self.inner).plays.last().map(|(h, _)| *h)
    }

    pub fn stops(&self) -> Vec<AudioHandle> {
        lock(&self.inner).stops.clone()
    }
}

impl AudioSink for SimulatedAudio {
    fn play(&mut self, clip: &AudioClip) -> Result<AudioHandle, AudioError> {
        let mut log = lock(&self.inner);
        if clip.is_empty() {
            return Err(AudioError::Undecodable);
        }
        if log.refuse_next {
            log.refuse_next = false;
            return Err(AudioError::PlaybackRefused("autoplay blocked".to_string()));
        }
        log.next_handle += 1;
        let handle = AudioHandle(log.next_handle);
        log.plays.push((handle, clip.clone()));
        Ok(handle)
    }

    fn stop(&mut self, handle: AudioHandle) {
        lock(&self.inner).stops.push(handle);
    }
}
