//! Conversation Session (turn lifecycle)
//!
//! At most one turn is active. A turn owns:
//! - the currently playing audio handle
//! - every timer it scheduled (fallback, safety, error grace)
//!
//! Audio completion races three callbacks (ended, error, safety timeout).
//! The first one claims the turn through a one-shot guard; the others find
//! it already claimed and do nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::audio::{AudioClip, AudioSink};
use crate::core::emotion::{EmotionSynchronizer, Link};
use crate::core::timers::{ConfirmStep, TimerId, TimerScope, TimerTable, TimerTask};
use crate::types::{AudioEvent, AudioEventKind, AudioHandle, EmotionReason};
use crate::NEUTRAL_EMOTION;

/// Turn identifier, unique per page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub u64);

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conv_{}", self.0)
    }
}

/// How a turn terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    AudioEnded,
    AudioError,
    SafetyTimeout,
    TextFallback,
    /// Ended by the host (server error, server conversation end)
    Interrupted,
}

impl EndCause {
    /// Audio completion paths report the turn back to the server
    pub fn notifies_server(&self) -> bool {
        matches!(self, Self::AudioEnded | Self::AudioError | Self::SafetyTimeout)
    }
}

/// A terminated turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnEnded {
    pub turn: TurnId,
    pub cause: EndCause,
}

/// Result of `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub turn: TurnId,
    /// Turn that was force-stopped to make room
    pub superseded: Option<TurnId>,
    /// Audio accepted by the sink
    pub playing: bool,
}

#[derive(Debug)]
struct ActiveTurn {
    id: TurnId,
    started_at: u64,
    emotion: String,
    audio: Option<AudioHandle>,
    timers: TimerScope,
    /// A termination path has claimed this turn
    finished: bool,
}

/// Turn lifecycle owner
pub struct ConversationSession {
    active: Option<ActiveTurn>,
    /// Neutral re-pushes after a turn end; outlive the turn itself
    confirmations: TimerScope,
    next_id: u64,
    audio: Box<dyn AudioSink>,
    text_fallback_ms: u64,
    error_grace_ms: u64,
    confirm_first_ms: u64,
    confirm_second_ms: u64,
    config: SyncConfig,
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("active", &self.active)
            .field("confirmations", &self.confirmations.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl ConversationSession {
    pub fn new(audio: Box<dyn AudioSink>, config: &SyncConfig) -> Self {
        Self {
            active: None,
            confirmations: TimerScope::new("neutral-confirm"),
            next_id: 1,
            audio,
            text_fallback_ms: config.text_turn_fallback_ms,
            error_grace_ms: config.audio_error_grace_ms,
            confirm_first_ms: config.neutral_confirm_first_ms,
            confirm_second_ms: config.neutral_confirm_second_ms,
            config: config.clone(),
        }
    }

    /// Begin a turn, force-stopping any active one first
    pub fn start(
        &mut self,
        sync: &mut EmotionSynchronizer,
        link: &mut Link<'_>,
        emotion: &str,
        audio: Option<&str>,
    ) -> StartOutcome {
        let superseded = self.stop_active(link.timers);
        self.confirmations.cancel_all(link.timers);

        let id = TurnId(self.next_id);
        self.next_id += 1;
        let mut turn = ActiveTurn {
            id,
            started_at: link.now,
            emotion: emotion.to_string(),
            audio: None,
            timers: TimerScope::new("turn"),
            finished: false,
        };

        let conversation = id.to_string();
        sync.push(link, emotion, true, EmotionReason::TurnStart, Some(&conversation));

        let clip = audio.map(AudioClip::from_payload).filter(|c| !c.is_empty());
        let mut playing = false;
        match clip {
            Some(clip) => match self.audio.play(&clip) {
                Ok(handle) => {
                    let estimate = clip.estimated_duration_ms();
                    let safety = self.config.audio_safety_timeout_ms(estimate);
                    info!(turn = %id, %handle, estimate_ms = estimate, safety_ms = safety, "turn started with audio");
                    turn.audio = Some(handle);
                    turn.timers
                        .schedule(link.timers, link.now, safety, TimerTask::AudioSafety(id));
                    playing = true;
                }
                Err(e) => {
                    warn!(turn = %id, error = %e, "audio playback failed");
                    turn.finished = true;
                    turn.timers.schedule(
                        link.timers,
                        link.now,
                        self.error_grace_ms,
                        TimerTask::AudioErrorGrace(id),
                    );
                }
            },
            None => {
                info!(turn = %id, "text-only turn started");
                turn.timers.schedule(
                    link.timers,
                    link.now,
                    self.text_fallback_ms,
                    TimerTask::TurnFallback(id),
                );
            }
        }

        self.active = Some(turn);
        StartOutcome {
            turn: id,
            superseded,
            playing,
        }
    }

    /// Terminate the active turn and return the avatar to neutral.
    /// On an idle session only the neutral pushes happen.
    pub fn end(
        &mut self,
        sync: &mut EmotionSynchronizer,
        link: &mut Link<'_>,
        cause: EndCause,
    ) -> Option<TurnEnded> {
        let ended = self.stop_active(link.timers).map(|turn| TurnEnded { turn, cause });
        match ended {
            Some(e) => info!(turn = %e.turn, ?cause, "turn ended"),
            None => debug!(?cause, "end on idle session"),
        }

        let conversation = ended.map(|e| e.turn.to_string());
        sync.push(
            link,
            NEUTRAL_EMOTION,
            false,
            EmotionReason::TurnEnd,
            conversation.as_deref(),
        );

        self.confirmations.cancel_all(link.timers);
        self.confirmations.schedule(
            link.timers,
            link.now,
            self.confirm_first_ms,
            TimerTask::NeutralConfirm(ConfirmStep::First),
        );
        self.confirmations.schedule(
            link.timers,
            link.now,
            self.confirm_second_ms,
            TimerTask::NeutralConfirm(ConfirmStep::Second),
        );
        ended
    }

    /// Synchronous stop: audio halted, timers cancelled, nothing reported
    fn stop_active(&mut self, table: &mut TimerTable) -> Option<TurnId> {
        let mut turn = self.active.take()?;
        if let Some(handle) = turn.audio.take() {
            self.audio.stop(handle);
        }
        turn.timers.cancel_all(table);
        debug!(turn = %turn.id, emotion = %turn.emotion, started_at = turn.started_at, "turn stopped");
        Some(turn.id)
    }

    /// Audio element callback
    pub fn on_audio_event(
        &mut self,
        sync: &mut EmotionSynchronizer,
        link: &mut Link<'_>,
        event: AudioEvent,
    ) -> Option<TurnEnded> {
        let grace_ms = self.error_grace_ms;
        let turn = match self.active.as_mut() {
            Some(turn) if turn.audio == Some(event.handle) => turn,
            _ => {
                debug!(handle = %event.handle, "audio event for a stale handle ignored");
                return None;
            }
        };
        if turn.finished {
            debug!(turn = %turn.id, kind = ?event.kind, "turn already claimed");
            return None;
        }
        turn.finished = true;

        match event.kind {
            AudioEventKind::Ended => self.end(sync, link, EndCause::AudioEnded),
            AudioEventKind::Error => {
                warn!(turn = %turn.id, "audio error, ending after grace period");
                turn.timers.cancel_all(link.timers);
                let id = turn.id;
                turn.timers.schedule(
                    link.timers,
                    link.now,
                    grace_ms,
                    TimerTask::AudioErrorGrace(id),
                );
                None
            }
        }
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.confirmations.contains(id)
            || self.active.as_ref().map_or(false, |t| t.timers.contains(id))
    }

    /// Timer callback for a timer `owns_timer` accepted
    pub fn on_timer(
        &mut self,
        id: TimerId,
        task: &TimerTask,
        sync: &mut EmotionSynchronizer,
        link: &mut Link<'_>,
    ) -> Option<TurnEnded> {
        if self.confirmations.release(id) {
            if let TimerTask::NeutralConfirm(step) = task {
                self.confirm_neutral(*step, sync, link);
            }
            return None;
        }

        let turn = self.active.as_mut()?;
        if !turn.timers.release(id) {
            return None;
        }
        match task {
            TimerTask::TurnFallback(t) if *t == turn.id => self.end(sync, link, EndCause::TextFallback),
            TimerTask::AudioErrorGrace(t) if *t == turn.id => self.end(sync, link, EndCause::AudioError),
            TimerTask::AudioSafety(t) if *t == turn.id => {
                if turn.finished {
                    return None;
                }
                turn.finished = true;
                warn!(turn = %turn.id, "audio never finished, safety timeout");
                self.end(sync, link, EndCause::SafetyTimeout)
            }
            _ => None,
        }
    }

    fn confirm_neutral(&mut self, step: ConfirmStep, sync: &mut EmotionSynchronizer, link: &mut Link<'_>) {
        match step {
            ConfirmStep::First => {
                sync.push(link, NEUTRAL_EMOTION, false, EmotionReason::EnsureNeutral, None);
            }
            ConfirmStep::Second => {
                if !sync.is_neutral() {
                    warn!(emotion = %sync.state().emotion, "avatar still not neutral, forcing");
                    sync.push(link, NEUTRAL_EMOTION, false, EmotionReason::ForceNeutral, None);
                }
            }
        }
    }

    /// Stop everything without neutral pushes (page unload)
    pub fn teardown(&mut self, table: &mut TimerTable) {
        self.stop_active(table);
        self.confirmations.cancel_all(table);
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        self.active.as_ref().map(|t| t.id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn audio_handle(&self) -> Option<AudioHandle> {
        self.active.as_ref().and_then(|t| t.audio)
    }

    /// Timers held by the active turn (0 when idle)
    pub fn active_timer_count(&self) -> usize {
        self.active.as_ref().map_or(0, |t| t.timers.len())
    }

    pub fn confirmation_timer_count(&self) -> usize {
        self.confirmations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::OutboundChannel;
    use crate::core::simulated::{SimulatedAudio, SimulatedRuntime};

    struct Rig {
        runtime: SimulatedRuntime,
        audio: SimulatedAudio,
        channel: OutboundChannel,
        table: TimerTable,
        sync: EmotionSynchronizer,
        session: ConversationSession,
    }

    impl Rig {
        fn new() -> Self {
            let config = SyncConfig::default();
            let runtime = SimulatedRuntime::new();
            let audio = SimulatedAudio::new();
            Self {
                channel: OutboundChannel::new(runtime.host(), &config, "page"),
                session: ConversationSession::new(audio.sink(), &config),
                sync: EmotionSynchronizer::new(&config),
                table: TimerTable::new(),
                runtime,
                audio,
            }
        }

        fn start(&mut self, now: u64, emotion: &str, audio: Option<&str>) -> StartOutcome {
            let mut link = Link::new(&mut self.channel, &mut self.table, now);
            self.session.start(&mut self.sync, &mut link, emotion, audio)
        }

        fn audio_event(&mut self, now: u64, event: AudioEvent) -> Option<TurnEnded> {
            let mut link = Link::new(&mut self.channel, &mut self.table, now);
            self.session.on_audio_event(&mut self.sync, &mut link, event)
        }

        /// Fire every timer up to `until`, collecting turn endings
        fn run(&mut self, until: u64) -> Vec<TurnEnded> {
            let mut ended = Vec::new();
            while let Some(due) = self.table.next_due() {
                if due > until {
                    break;
                }
                let (id, task) = self.table.pop_due(due).unwrap();
                if self.channel.on_timer(id, due, &mut self.table) {
                    continue;
                }
                if self.session.owns_timer(id) {
                    let mut link = Link::new(&mut self.channel, &mut self.table, due);
                    ended.extend(self.session.on_timer(id, &task, &mut self.sync, &mut link));
                }
            }
            ended
        }
    }

    fn wav_seconds(seconds: usize) -> String {
        "A".repeat((44 + seconds * 48_000) * 4 / 3)
    }

    #[test]
    fn test_text_turn_ends_after_fallback() {
        let mut rig = Rig::new();
        let outcome = rig.start(0, "happy", None);
        assert!(!outcome.playing);
        assert_eq!(rig.session.active_timer_count(), 1);

        assert!(rig.run(2999).is_empty());
        let ended = rig.run(3000);
        assert_eq!(
            ended,
            vec![TurnEnded {
                turn: outcome.turn,
                cause: EndCause::TextFallback
            }]
        );
        assert!(!rig.session.is_active());
        assert_eq!(rig.session.active_timer_count(), 0);
    }

    #[test]
    fn test_start_supersedes_active_turn() {
        let mut rig = Rig::new();
        let first = rig.start(0, "happy", Some(&wav_seconds(2)));
        let first_handle = rig.session.audio_handle().unwrap();

        let second = rig.start(200, "sad", None);
        assert_eq!(second.superseded, Some(first.turn));
        assert_eq!(rig.audio.stops(), vec![first_handle]);
        assert_eq!(rig.session.active_turn(), Some(second.turn));
        assert_eq!(rig.session.active_timer_count(), 1);
        // Only the new turn's fallback and channel pumps remain
        assert!(rig.run(60_000).iter().all(|e| e.turn == second.turn));
    }

    #[test]
    fn test_ended_then_error_terminates_once() {
        let mut rig = Rig::new();
        rig.start(0, "happy", Some(&wav_seconds(1)));
        let handle = rig.session.audio_handle().unwrap();

        let ended = rig.audio_event(1000, AudioEvent { handle, kind: AudioEventKind::Ended });
        assert_eq!(ended.map(|e| e.cause), Some(EndCause::AudioEnded));
        assert!(rig.audio_event(1001, AudioEvent { handle, kind: AudioEventKind::Error }).is_none());
        assert!(rig.run(120_000).is_empty());
    }

    #[test]
    fn test_safety_timeout_fires_once() {
        let mut rig = Rig::new();
        let outcome = rig.start(0, "happy", Some(&wav_seconds(3)));
        assert!(outcome.playing);

        assert!(rig.run(59_999).is_empty());
        let ended = rig.run(120_000);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].cause, EndCause::SafetyTimeout);
    }

    #[test]
    fn test_audio_error_ends_after_grace() {
        let mut rig = Rig::new();
        rig.start(0, "happy", Some(&wav_seconds(1)));
        let handle = rig.session.audio_handle().unwrap();

        assert!(rig.audio_event(500, AudioEvent { handle, kind: AudioEventKind::Error }).is_none());
        assert!(rig.run(2499).is_empty());
        let ended = rig.run(2500);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].cause, EndCause::AudioError);
        assert!(ended[0].cause.notifies_server());
    }

    #[test]
    fn test_refused_playback_uses_grace() {
        let mut rig = Rig::new();
        rig.audio.refuse_next_play();
        let outcome = rig.start(0, "happy", Some(&wav_seconds(1)));
        assert!(!outcome.playing);
        let ended = rig.run(2000);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].cause, EndCause::AudioError);
    }

    #[test]
    fn test_end_pushes_neutral_and_forces_if_needed() {
        let mut rig = Rig::new();
        rig.start(0, "happy", None);
        rig.run(3000);

        let emotions: Vec<(Option<String>, Option<bool>)> = rig
            .runtime
            .emotion_commands()
            .into_iter()
            .map(|c| (c.emotion, c.talking))
            .collect();
        assert_eq!(
            emotions,
            vec![
                (Some("happy".to_string()), Some(true)),
                (Some(NEUTRAL_EMOTION.to_string()), Some(false)),
            ]
        );
        // Confirmations pending, then gone
        assert_eq!(rig.session.confirmation_timer_count(), 2);
        rig.run(4000);
        assert_eq!(rig.session.confirmation_timer_count(), 0);
        assert!(rig.sync.is_neutral());
    }

    #[test]
    fn test_end_on_idle_only_pushes_neutral() {
        let mut rig = Rig::new();
        let mut link = Link::new(&mut rig.channel, &mut rig.table, 0);
        assert!(rig.session.end(&mut rig.sync, &mut link, EndCause::Interrupted).is_none());
        assert!(rig.audio.stops().is_empty());
    }
}
