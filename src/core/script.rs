//! Timeline replay
//!
//! A script is JSON lines, one step per line, each stamped with the virtual
//! time it happens at:
//!
//! ```text
//! {"at": 0,    "connection": "connected"}
//! {"at": 0,    "audio_ready": true}
//! {"at": 100,  "runtime": {"type": "runtime-fully-initialized"}}
//! {"at": 150,  "server": {"event": "response", "data": {"message": "Hi", "audio": "..."}}}
//! {"at": 4000, "audio": "ended"}
//! {"at": 4100, "callback": {"name": "motion-changed", "argument": "idle"}}
//! {"at": 4200, "custom_event": "RuntimeReady"}
//! ```
//!
//! Steps run against a simulated runtime and simulated audio on a manual
//! clock. Blank lines and lines starting with `#` are skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::SyncConfig;
use crate::core::clock::ManualClock;
use crate::core::orchestrator::Orchestrator;
use crate::core::simulated::{DeliveryAttempt, SimulatedAudio, SimulatedRuntime};
use crate::core::visitor::MemoryStore;
use crate::types::{AudioEvent, AudioEventKind, ConnectionStatus, Effect, ServerEvent};

/// Script load failure
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: time goes backwards ({at} < {previous})")]
    TimeReversed { line: usize, at: u64, previous: u64 },
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptAction {
    /// Backend event
    Server(ServerEvent),
    /// Raw runtime frame message
    Runtime(Value),
    /// In-process runtime callback
    Callback(CallbackStep),
    /// Window custom event name
    CustomEvent(String),
    /// Completion of the clip currently playing
    Audio(AudioEventKind),
    Connection(ConnectionStatus),
    AudioReady(bool),
    /// Toggle whether the simulated runtime can be acquired
    RuntimeAvailable(bool),
    /// Fail the next N deliveries
    FailDeliveries(u32),
    /// Only advance time
    Wait(bool),
}

/// Callback name and optional argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackStep {
    pub name: String,
    #[serde(default)]
    pub argument: Option<String>,
}

/// One script line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub at: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

/// Parse a whole script
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    let mut previous = 0;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line).map_err(|source| ScriptError::Parse {
            line: index + 1,
            source,
        })?;
        if step.at < previous {
            return Err(ScriptError::TimeReversed {
                line: index + 1,
                at: step.at,
                previous,
            });
        }
        previous = step.at;
        steps.push(step);
    }
    Ok(steps)
}

pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<ScriptStep>, ScriptError> {
    let text = std::fs::read_to_string(path)?;
    parse_script(&text)
}

/// Something observable that happened during replay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    /// Runtime delivery attempt observed after the step at `at`
    Delivery { at: u64, attempt: TraceDelivery },
    Effect { at: u64, effect: Effect },
}

/// Serializable view of a delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceDelivery {
    pub delivered: bool,
    pub payload: Value,
}

impl From<&DeliveryAttempt> for TraceDelivery {
    fn from(attempt: &DeliveryAttempt) -> Self {
        Self {
            delivered: attempt.delivered,
            payload: serde_json::from_str(&attempt.payload)
                .unwrap_or_else(|_| Value::String(attempt.payload.clone())),
        }
    }
}

/// Orchestrator wired to simulated collaborators
pub struct ScriptRunner {
    clock: ManualClock,
    runtime: SimulatedRuntime,
    audio: SimulatedAudio,
    orchestrator: Orchestrator,
    seen_attempts: usize,
    trace: Vec<TraceEntry>,
}

impl ScriptRunner {
    pub fn new(config: SyncConfig) -> Self {
        let clock = ManualClock::new(0);
        let runtime = SimulatedRuntime::unavailable();
        let audio = SimulatedAudio::new();
        let orchestrator = Orchestrator::new(
            config,
            runtime.host(),
            audio.sink(),
            Box::new(MemoryStore::new()),
            Box::new(clock.clone()),
        );
        Self {
            clock,
            runtime,
            audio,
            orchestrator,
            seen_attempts: 0,
            trace: Vec::new(),
        }
    }

    /// Run every step, then keep time moving for `settle_ms`
    pub fn run(&mut self, steps: &[ScriptStep], settle_ms: u64) -> &[TraceEntry] {
        self.runtime.set_available(true);
        for step in steps {
            self.advance_to(step.at);
            self.apply(&step.action);
            self.collect(step.at);
        }
        let end = self.clock_now() + settle_ms;
        self.advance_to(end);
        &self.trace
    }

    /// Advance in timer-sized hops so the trace keeps its time resolution
    fn advance_to(&mut self, target: u64) {
        while let Some(due) = self.orchestrator.next_due() {
            if due > target {
                break;
            }
            self.clock.set(due);
            self.orchestrator.tick();
            self.collect(due);
        }
        self.clock.set(target);
        self.orchestrator.tick();
        self.collect(target);
    }

    fn apply(&mut self, action: &ScriptAction) {
        debug!(?action, at = self.clock_now(), "script step");
        match action {
            ScriptAction::Server(event) => self.orchestrator.handle_server_event(event.clone()),
            ScriptAction::Runtime(message) => {
                self.orchestrator.handle_frame_message(message);
            }
            ScriptAction::Callback(step) => {
                self.orchestrator
                    .handle_callback(&step.name, step.argument.as_deref());
            }
            ScriptAction::CustomEvent(name) => {
                self.orchestrator.handle_custom_event(name);
            }
            ScriptAction::Audio(kind) => {
                if let Some(handle) = self.orchestrator.session().audio_handle() {
                    self.orchestrator.handle_audio_event(AudioEvent { handle, kind: *kind });
                }
            }
            ScriptAction::Connection(status) => self.orchestrator.set_connection_status(*status),
            ScriptAction::AudioReady(true) => self.orchestrator.mark_audio_initialized(),
            ScriptAction::AudioReady(false) => {}
            ScriptAction::RuntimeAvailable(available) => self.runtime.set_available(*available),
            ScriptAction::FailDeliveries(count) => self.runtime.fail_next(*count),
            ScriptAction::Wait(_) => {}
        }
    }

    fn collect(&mut self, at: u64) {
        let attempts = self.runtime.attempts();
        for attempt in &attempts[self.seen_attempts..] {
            self.trace.push(TraceEntry::Delivery {
                at,
                attempt: attempt.into(),
            });
        }
        self.seen_attempts = attempts.len();
        for effect in self.orchestrator.drain_effects() {
            self.trace.push(TraceEntry::Effect { at, effect });
        }
    }

    fn clock_now(&self) -> u64 {
        self.orchestrator.now_ms()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn runtime(&self) -> &SimulatedRuntime {
        &self.runtime
    }

    pub fn audio(&self) -> &SimulatedAudio {
        &self.audio
    }
}
