//! Shared harness: an orchestrator on a manual clock with simulated
//! runtime, audio and visitor store.

#![allow(dead_code)]

use serde_json::json;

use avatar_sync::config::SyncConfig;
use avatar_sync::core::{ManualClock, MemoryStore, Orchestrator, SimulatedAudio, SimulatedRuntime};
use avatar_sync::types::{
    AudioEvent, AudioEventKind, ClientEvent, ConnectionStatus, Effect, EmotionReason,
    OutboundCommand, ServerEvent, SpokenMessage, UiNotice,
};

pub struct Harness {
    pub clock: ManualClock,
    pub runtime: SimulatedRuntime,
    pub audio: SimulatedAudio,
    pub store: MemoryStore,
    pub core: Orchestrator,
    effects: Vec<Effect>,
}

impl Harness {
    /// Runtime loaded, nothing else ready
    pub fn new() -> Self {
        Self::build(SimulatedRuntime::new(), MemoryStore::new())
    }

    /// Runtime not loaded yet
    pub fn without_runtime() -> Self {
        Self::build(SimulatedRuntime::unavailable(), MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self::build(SimulatedRuntime::new(), store)
    }

    fn build(runtime: SimulatedRuntime, store: MemoryStore) -> Self {
        let clock = ManualClock::new(0);
        let audio = SimulatedAudio::new();
        let core = Orchestrator::new(
            SyncConfig::default(),
            runtime.host(),
            audio.sink(),
            Box::new(store.clone()),
            Box::new(clock.clone()),
        );
        Self {
            clock,
            runtime,
            audio,
            store,
            core,
            effects: Vec::new(),
        }
    }

    /// Move time forward, firing timers at their own due times
    pub fn advance(&mut self, ms: u64) {
        let target = self.core.now_ms() + ms;
        while let Some(due) = self.core.next_due() {
            if due > target {
                break;
            }
            self.clock.set(due);
            self.core.tick();
        }
        self.clock.set(target);
        self.core.tick();
        self.collect();
    }

    /// Socket connected and local audio unlocked
    pub fn connect(&mut self) {
        self.core.set_connection_status(ConnectionStatus::Connected);
        self.core.mark_audio_initialized();
        self.collect();
    }

    pub fn frame(&mut self, kind: &str) -> bool {
        let handled = self.core.handle_frame_message(&json!({ "type": kind }));
        self.collect();
        handled
    }

    /// Every readiness stage reached
    pub fn make_ready(&mut self) {
        self.connect();
        self.frame("runtime-fully-initialized");
        self.frame("start-motion-completed");
    }

    pub fn server(&mut self, event: ServerEvent) {
        self.core.handle_server_event(event);
        self.collect();
    }

    pub fn audio_event(&mut self, kind: AudioEventKind) {
        if let Some(handle) = self.core.session().audio_handle() {
            self.core.handle_audio_event(AudioEvent { handle, kind });
            self.collect();
        }
    }

    fn collect(&mut self) {
        self.effects.extend(self.core.drain_effects());
    }

    /// Effects gathered since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        self.collect();
        std::mem::take(&mut self.effects)
    }

    pub fn emotions(&self) -> Vec<OutboundCommand> {
        self.runtime.emotion_commands()
    }

    pub fn emotions_with(&self, reason: EmotionReason) -> Vec<OutboundCommand> {
        self.emotions()
            .into_iter()
            .filter(|c| c.reason == Some(reason))
            .collect()
    }

    pub fn last_emotion(&self) -> Option<(String, bool)> {
        self.emotions()
            .last()
            .and_then(|c| Some((c.emotion.clone()?, c.talking?)))
    }
}

/// Bare base64 WAV body about `seconds` long
pub fn wav_seconds(seconds: usize) -> String {
    "A".repeat((44 + seconds * 48_000) * 4 / 3)
}

pub fn response(message: &str, emotion: &str, audio: Option<String>) -> ServerEvent {
    ServerEvent::Response(SpokenMessage {
        message: message.to_string(),
        emotion: Some(emotion.to_string()),
        audio,
        suggestions: Vec::new(),
    })
}

pub fn greeting(message: &str, audio: Option<String>) -> ServerEvent {
    ServerEvent::Greeting(SpokenMessage {
        message: message.to_string(),
        emotion: Some("happy".to_string()),
        audio,
        suggestions: vec!["Tell me more".to_string()],
    })
}

pub fn conversation_ended(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e.as_server(), Some(ClientEvent::ConversationEnded { .. })))
        .count()
}

pub fn notices(effects: &[Effect]) -> Vec<&UiNotice> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Ui { notice } => Some(notice),
            Effect::Server { .. } => None,
        })
        .collect()
}
