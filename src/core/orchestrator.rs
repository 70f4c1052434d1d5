//! Orchestrator
//!
//! Owns one instance of every component plus the timer table and the clock,
//! and is the only entry point for the three inbound timelines:
//! - server events (`handle_server_event`)
//! - runtime signals (`handle_runtime_signal`, `handle_frame_message`)
//! - audio callbacks (`handle_audio_event`)
//!
//! Time only moves through `tick()`. Every handler first catches up on due
//! timers so nothing fires out of order. Server-bound events and UI notices
//! are buffered as `Effect`s for the host to drain.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::audio::{AudioClip, AudioSink};
use crate::core::channel::{OutboundChannel, RuntimeHost};
use crate::core::clock::Clock;
use crate::core::emotion::{EmotionSynchronizer, Link};
use crate::core::intro::{IntroductionCoordinator, ReadinessView};
use crate::core::readiness::ReadinessTracker;
use crate::core::relationship::RelationshipMeter;
use crate::core::session::{ConversationSession, EndCause, StartOutcome, TurnEnded, TurnId};
use crate::core::signals::{self, completes_start_motion};
use crate::core::timers::{TimerId, TimerScope, TimerTable, TimerTask};
use crate::core::visitor::{VisitRecord, VisitorStore};
use crate::types::{
    AuditOutcome, AudioEvent, ClientEvent, CommandBody, ConnectionStatus, Effect, EmotionReason,
    EmotionState, IntroPayload, IntroductionState, MessageKind, QuizAnswerResult, QuizFinalResult,
    QuizQuestion, ReadinessTransition, RejectReason, RuntimeSignal, ServerEvent, SignalSource,
    SpokenMessage, StatusSnapshot, UiNotice,
};
use crate::NEUTRAL_EMOTION;

/// Emotion shown while reading out a quiz question
const QUIZ_QUESTION_EMOTION: &str = "neutraltalking";
/// Emotion for the quiz result
const QUIZ_FINAL_EMOTION: &str = "happy";

/// Turn held back until the runtime is fully ready
#[derive(Debug, Clone, PartialEq)]
struct PendingStart {
    emotion: String,
    audio: String,
}

/// Synchronization core
pub struct Orchestrator {
    config: SyncConfig,
    clock: Box<dyn Clock>,
    timers: TimerTable,
    channel: OutboundChannel,
    readiness: ReadinessTracker,
    emotions: EmotionSynchronizer,
    session: ConversationSession,
    intro: IntroductionCoordinator,
    store: Box<dyn VisitorStore>,
    visitor: VisitRecord,
    meter: RelationshipMeter,
    quiz_active: bool,
    /// Set when the meter reaches its top level; consumed by the next turn end
    propose_quiz_after_turn: bool,
    /// Visitor info already scheduled for the current socket connection
    visitor_info_scheduled: bool,
    intro_turn: Option<TurnId>,
    pending_start: Option<PendingStart>,
    pending_timer: Option<TimerId>,
    /// Visitor info, quiz follow-ups, pending-start timeout
    own_timers: TimerScope,
    effects: Vec<Effect>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("channel", &self.channel)
            .field("readiness", &self.readiness)
            .field("session", &self.session)
            .field("intro", &self.intro.state())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        config: SyncConfig,
        host: Box<dyn RuntimeHost>,
        audio: Box<dyn AudioSink>,
        mut store: Box<dyn VisitorStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let session_id = format!("page_{}", uuid::Uuid::new_v4().simple());
        let mut visitor = match store.load() {
            Ok(Some(record)) => record,
            Ok(None) => VisitRecord::new_visitor(),
            Err(e) => {
                warn!(error = %e, "visitor record unreadable, starting fresh");
                VisitRecord::new_visitor()
            }
        };
        visitor.register_visit();
        if let Err(e) = store.save(&visitor) {
            warn!(error = %e, "visitor record not saved");
        }
        info!(session = %session_id, visitor = %visitor.visitor_id, visits = visitor.visit_count, "page session started");

        let mut orchestrator = Self {
            channel: OutboundChannel::new(host, &config, session_id),
            readiness: ReadinessTracker::new(&config),
            emotions: EmotionSynchronizer::new(&config),
            session: ConversationSession::new(audio, &config),
            intro: IntroductionCoordinator::new(&config),
            meter: RelationshipMeter::new(visitor.total_conversations, visitor.quiz_completed),
            store,
            visitor,
            quiz_active: false,
            propose_quiz_after_turn: false,
            visitor_info_scheduled: false,
            intro_turn: None,
            pending_start: None,
            pending_timer: None,
            own_timers: TimerScope::new("orchestrator"),
            effects: Vec::new(),
            timers: TimerTable::new(),
            clock,
            config,
        };
        orchestrator.boot();
        orchestrator
    }

    /// Immediate acquisition attempt, then periodic polling
    fn boot(&mut self) {
        let now = self.clock.now_ms();
        let transitions = self.readiness.try_acquire(&mut self.channel, now, &mut self.timers);
        self.readiness.start_polling(now, &mut self.timers);
        self.apply_transitions(transitions, now);
    }

    // =========================================================================
    // TIME
    // =========================================================================

    /// Fire every timer due by the current clock, in due order.
    /// Each task runs at its own due time.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut fired = 0;
        while let Some(due) = self.timers.next_due() {
            if due > now {
                break;
            }
            let Some((id, task)) = self.timers.pop_due(due) else {
                break;
            };
            self.dispatch(id, task, due);
            fired += 1;
        }
        fired
    }

    fn dispatch(&mut self, id: TimerId, task: TimerTask, now: u64) {
        if self.channel.on_timer(id, now, &mut self.timers) {
            return;
        }
        if let Some(transitions) =
            self.readiness
                .on_timer(id, &task, &mut self.channel, now, &mut self.timers)
        {
            self.apply_transitions(transitions, now);
            return;
        }
        if self.session.owns_timer(id) {
            let mut link = Link::new(&mut self.channel, &mut self.timers, now);
            let ended = self.session.on_timer(id, &task, &mut self.emotions, &mut link);
            if let Some(ended) = ended {
                self.on_turn_ended(ended, now);
            }
            return;
        }
        if let Some(launch) = self.intro.on_timer(id, &task, now, &mut self.timers) {
            if let Some(payload) = launch {
                self.execute_intro(payload, now);
            }
            return;
        }
        if self.own_timers.release(id) {
            self.on_own_timer(id, task, now);
            return;
        }
        debug!(?task, "stale timer ignored");
    }

    fn on_own_timer(&mut self, id: TimerId, task: TimerTask, now: u64) {
        match task {
            TimerTask::VisitorInfo => {
                if self.readiness.state().connection_status == ConnectionStatus::Disconnected {
                    debug!("disconnected, visitor info not sent");
                    return;
                }
                self.effects.push(Effect::server(ClientEvent::VisitorInfo {
                    visitor_id: self.visitor.visitor_id.clone(),
                    visit_count: self.visitor.visit_count,
                    total_conversations: self.visitor.total_conversations,
                }));
            }
            TimerTask::PendingStartTimeout => {
                if self.pending_timer == Some(id) {
                    self.pending_timer = None;
                }
                if let Some(pending) = self.pending_start.take() {
                    warn!("runtime still not ready, forcing held turn");
                    self.start_turn(&pending.emotion, Some(&pending.audio), now);
                }
            }
            TimerTask::QuizExplanation { text, emotion, audio } => {
                self.render(MessageKind::Quiz, &text);
                if let Some(audio) = audio {
                    self.begin_turn(&emotion, Some(audio), now);
                }
            }
            TimerTask::QuizFollowUp(event) => {
                if self.readiness.state().connection_status == ConnectionStatus::Disconnected {
                    warn!("disconnected, quiz follow-up dropped");
                    return;
                }
                self.effects.push(Effect::server(event));
            }
            TimerTask::QuizProposalRequest => {
                if self.quiz_active || self.visitor.quiz_completed {
                    debug!("quiz already under way or done, proposal not requested");
                    return;
                }
                if self.readiness.state().connection_status == ConnectionStatus::Disconnected {
                    warn!("disconnected, quiz proposal request dropped");
                    return;
                }
                info!("requesting quiz proposal");
                self.effects.push(Effect::server(ClientEvent::RequestQuizProposal));
            }
            other => debug!(task = ?other, "unexpected orchestrator timer"),
        }
    }

    // =========================================================================
    // READINESS
    // =========================================================================

    fn apply_transitions(&mut self, transitions: Vec<ReadinessTransition>, now: u64) {
        if transitions.is_empty() {
            return;
        }
        for transition in transitions {
            debug!(?transition, "readiness transition");
            match transition {
                ReadinessTransition::InstanceAcquired => {
                    self.channel
                        .enqueue(CommandBody::init_check(), now, &mut self.timers);
                    let mut link = Link::new(&mut self.channel, &mut self.timers, now);
                    self.emotions.push(
                        &mut link,
                        NEUTRAL_EMOTION,
                        false,
                        EmotionReason::Initialization,
                        None,
                    );
                }
                ReadinessTransition::Disconnected => self.channel.invalidate(),
                ReadinessTransition::ConnectionChanged(ConnectionStatus::Connected) => {
                    if !self.visitor_info_scheduled {
                        self.visitor_info_scheduled = true;
                        self.own_timers.schedule(
                            &mut self.timers,
                            now,
                            self.config.visitor_info_delay_ms,
                            TimerTask::VisitorInfo,
                        );
                    }
                }
                ReadinessTransition::ConnectionChanged(ConnectionStatus::Disconnected) => {
                    self.visitor_info_scheduled = false;
                }
                _ => {}
            }
        }
        self.on_readiness_changed(now);
    }

    /// Readiness listeners: introduction progress, then the held turn
    fn on_readiness_changed(&mut self, now: u64) {
        let view = self.readiness_view();
        self.intro.on_readiness(view, now, &mut self.timers);

        if self.readiness.is_fully_ready() {
            if let Some(pending) = self.pending_start.take() {
                if let Some(id) = self.pending_timer.take() {
                    self.own_timers.cancel(&mut self.timers, id);
                }
                info!("runtime ready, starting held turn");
                self.start_turn(&pending.emotion, Some(&pending.audio), now);
            }
        }
    }

    fn readiness_view(&self) -> ReadinessView {
        ReadinessView {
            minimally_ready: self.readiness.is_minimally_ready(),
            start_motion_completed: self.readiness.state().start_motion_completed,
        }
    }

    /// Normalized runtime signal from any transport
    pub fn handle_runtime_signal(&mut self, signal: RuntimeSignal, source: SignalSource) {
        let now = self.catch_up();
        debug!(?signal, %source, "runtime signal");
        let transitions = match &signal {
            s if completes_start_motion(s) => self
                .readiness
                .mark_start_motion_complete(now, &mut self.timers),
            RuntimeSignal::Ready => {
                self.readiness
                    .try_acquire(&mut self.channel, now, &mut self.timers)
            }
            RuntimeSignal::FullyInitialized => {
                self.readiness.mark_fully_initialized(now, &mut self.timers)
            }
            RuntimeSignal::MotionChanged { motion } => {
                debug!(motion = %motion, "motion changed");
                Vec::new()
            }
            RuntimeSignal::EmotionEcho { emotion, talking } => {
                info!(emotion = %emotion, talking, "runtime applied emotion");
                Vec::new()
            }
            RuntimeSignal::Disconnected => self.readiness.mark_disconnected(now, &mut self.timers),
            RuntimeSignal::StartMotionCompleted => Vec::new(),
        };
        self.apply_transitions(transitions, now);
    }

    /// Raw frame message. False if it is not a runtime signal.
    pub fn handle_frame_message(&mut self, message: &Value) -> bool {
        match signals::from_frame_message(message) {
            Some(n) => {
                self.handle_runtime_signal(n.signal, n.source);
                true
            }
            None => {
                debug!(%message, "frame message ignored");
                false
            }
        }
    }

    /// In-process runtime callback. False if the name is not a runtime signal.
    pub fn handle_callback(&mut self, name: &str, argument: Option<&str>) -> bool {
        match signals::from_callback(name, argument) {
            Some(n) => {
                self.handle_runtime_signal(n.signal, n.source);
                true
            }
            None => {
                debug!(name, "runtime callback ignored");
                false
            }
        }
    }

    /// Window custom event such as `RuntimeReady`
    pub fn handle_custom_event(&mut self, name: &str) -> bool {
        match signals::from_custom_event(name) {
            Some(n) => {
                self.handle_runtime_signal(n.signal, n.source);
                true
            }
            None => {
                debug!(name, "custom event ignored");
                false
            }
        }
    }

    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        let now = self.catch_up();
        let transitions = self.readiness.set_connection_status(status);
        self.apply_transitions(transitions, now);
    }

    /// Local audio output became usable (user gesture)
    pub fn mark_audio_initialized(&mut self) {
        let now = self.catch_up();
        let transitions = self.readiness.mark_audio_initialized();
        self.apply_transitions(transitions, now);
    }

    // =========================================================================
    // AUDIO
    // =========================================================================

    pub fn handle_audio_event(&mut self, event: AudioEvent) {
        let now = self.catch_up();
        let mut link = Link::new(&mut self.channel, &mut self.timers, now);
        if let Some(ended) = self.session.on_audio_event(&mut self.emotions, &mut link, event) {
            self.on_turn_ended(ended, now);
        }
    }

    // =========================================================================
    // TURNS
    // =========================================================================

    /// Start now, or hold an audio turn until the runtime is fully ready
    fn begin_turn(&mut self, emotion: &str, audio: Option<String>, now: u64) {
        match audio.filter(|a| !a.trim().is_empty()) {
            Some(audio) if !self.readiness.is_fully_ready() => {
                if self.pending_start.is_some() {
                    debug!("replacing held turn");
                }
                info!(emotion, "runtime not ready, holding turn");
                self.pending_start = Some(PendingStart {
                    emotion: emotion.to_string(),
                    audio,
                });
                if self.pending_timer.is_none() {
                    self.pending_timer = Some(self.own_timers.schedule(
                        &mut self.timers,
                        now,
                        self.config.pending_start_timeout_ms,
                        TimerTask::PendingStartTimeout,
                    ));
                }
            }
            audio => {
                self.start_turn(emotion, audio.as_deref(), now);
            }
        }
    }

    fn start_turn(&mut self, emotion: &str, audio: Option<&str>, now: u64) -> StartOutcome {
        let mut link = Link::new(&mut self.channel, &mut self.timers, now);
        let outcome = self.session.start(&mut self.emotions, &mut link, emotion, audio);
        if let Some(previous) = outcome.superseded {
            self.on_turn_released(previous);
        }
        outcome
    }

    fn on_turn_ended(&mut self, ended: TurnEnded, now: u64) {
        if ended.cause.notifies_server() {
            self.effects.push(Effect::server(ClientEvent::ConversationEnded {
                conversation_id: ended.turn.to_string(),
            }));
        }
        self.on_turn_released(ended.turn);

        if self.propose_quiz_after_turn && !self.quiz_active && !self.visitor.quiz_completed {
            self.propose_quiz_after_turn = false;
            self.own_timers.schedule(
                &mut self.timers,
                now,
                self.config.quiz_proposal_request_delay_ms,
                TimerTask::QuizProposalRequest,
            );
        }
    }

    /// A turn is over, whichever way
    fn on_turn_released(&mut self, turn: TurnId) {
        if self.intro_turn == Some(turn) {
            self.intro_turn = None;
            self.intro.complete();
        }
    }

    fn execute_intro(&mut self, payload: IntroPayload, now: u64) {
        self.render(MessageKind::Greeting, &payload.message);
        self.suggest(&payload.suggestions);

        match payload.audio.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(audio) => {
                let outcome = self.start_turn(&payload.emotion, Some(audio), now);
                self.intro_turn = Some(outcome.turn);
            }
            None => {
                let mut link = Link::new(&mut self.channel, &mut self.timers, now);
                self.emotions.push(
                    &mut link,
                    NEUTRAL_EMOTION,
                    false,
                    EmotionReason::GreetingTextOnly,
                    None,
                );
                self.intro.complete();
            }
        }
    }

    // =========================================================================
    // SERVER EVENTS
    // =========================================================================

    pub fn handle_server_event(&mut self, event: ServerEvent) {
        let now = self.catch_up();
        debug!(event = event.name(), "server event");
        match event {
            ServerEvent::Greeting(msg) => self.on_greeting(msg, now),
            ServerEvent::Response(msg) => self.on_response(msg, now),
            ServerEvent::QuizProposal(msg) => self.on_quiz_proposal(msg, now),
            ServerEvent::QuizQuestion(q) => self.on_quiz_question(q, now),
            ServerEvent::QuizAnswerResult(r) => self.on_quiz_answer_result(r, now),
            ServerEvent::QuizFinalResult(f) => self.on_quiz_final_result(f, now),
            ServerEvent::ConversationStart(marker) => {
                let emotion = marker.emotion.unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
                self.push_emotion(&emotion, true, EmotionReason::ServerTurnStart, now);
            }
            ServerEvent::ConversationEnd(_) => {
                self.push_emotion(NEUTRAL_EMOTION, false, EmotionReason::ServerTurnEnd, now);
            }
            ServerEvent::Error(err) => {
                let text = err.message.unwrap_or_else(|| "Unknown error".to_string());
                warn!(message = %text, "server error");
                self.effects.push(Effect::ui(UiNotice::Error { text }));
                let transitions = self.readiness.set_connection_status(ConnectionStatus::Error);
                self.apply_transitions(transitions, now);

                if self.session.is_active() {
                    let mut link = Link::new(&mut self.channel, &mut self.timers, now);
                    if let Some(ended) = self.session.end(&mut self.emotions, &mut link, EndCause::Interrupted) {
                        self.on_turn_ended(ended, now);
                    }
                } else {
                    self.push_emotion(NEUTRAL_EMOTION, false, EmotionReason::Emergency, now);
                }
            }
        }
    }

    fn on_greeting(&mut self, msg: SpokenMessage, now: u64) {
        let emotion = msg.emotion.clone().unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
        let has_audio = msg.audio.as_deref().map_or(false, |a| !a.trim().is_empty());
        if !has_audio {
            self.render(MessageKind::Greeting, &msg.message);
            self.suggest(&msg.suggestions);
            self.push_emotion(NEUTRAL_EMOTION, false, EmotionReason::GreetingTextOnly, now);
            return;
        }

        let payload = IntroPayload {
            message: msg.message,
            emotion,
            audio: msg.audio,
            suggestions: msg.suggestions,
        };
        let view = self.readiness_view();
        let outcome = self
            .intro
            .request("greeting", payload.clone(), view, now, &mut self.timers);
        if outcome == AuditOutcome::Rejected(RejectReason::AlreadyCompleted) {
            // Later greetings (language change) play as ordinary turns
            self.render(MessageKind::Greeting, &payload.message);
            self.suggest(&payload.suggestions);
            self.begin_turn(&payload.emotion, payload.audio, now);
        }
    }

    fn on_response(&mut self, msg: SpokenMessage, now: u64) {
        if self.readiness.state().connection_status != ConnectionStatus::Connected {
            let transitions = self.readiness.set_connection_status(ConnectionStatus::Connected);
            self.apply_transitions(transitions, now);
        }
        self.render(MessageKind::Response, &msg.message);
        self.suggest(&msg.suggestions);

        self.visitor.total_conversations += 1;
        self.persist_visitor();
        self.update_meter();

        let emotion = msg.emotion.unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
        self.begin_turn(&emotion, msg.audio, now);
    }

    fn on_quiz_proposal(&mut self, msg: SpokenMessage, now: u64) {
        if self.quiz_active || self.visitor.quiz_completed {
            debug!("quiz proposal ignored");
            return;
        }
        let emotion = msg.emotion.unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
        self.render(MessageKind::Quiz, &msg.message);
        self.push_emotion(&emotion, true, EmotionReason::QuizProposal, now);
        // A text-only proposal still runs as a turn so its fallback returns to neutral
        self.begin_turn(&emotion, msg.audio, now);
        self.effects.push(Effect::ui(UiNotice::QuizChoices));
    }

    fn on_quiz_question(&mut self, q: QuizQuestion, now: u64) {
        self.quiz_active = true;
        self.render(
            MessageKind::Quiz,
            &format!("Question {}: {}", q.question_index + 1, q.question),
        );
        self.push_emotion(QUIZ_QUESTION_EMOTION, true, EmotionReason::QuizQuestion, now);
        self.begin_turn(QUIZ_QUESTION_EMOTION, q.audio, now);
        self.effects.push(Effect::ui(UiNotice::QuizOptions {
            question_index: q.question_index,
            options: q.options,
        }));
    }

    fn on_quiz_answer_result(&mut self, r: QuizAnswerResult, now: u64) {
        let emotion = r.emotion.clone().unwrap_or_else(|| NEUTRAL_EMOTION.to_string());
        self.render(MessageKind::Quiz, &r.result_message);
        self.push_emotion(&emotion, true, EmotionReason::QuizResult, now);
        if r.audio.is_none() {
            // With audio the turn starts alongside the explanation
            self.begin_turn(&emotion, None, now);
        }

        let audio_ms = r
            .audio
            .as_deref()
            .map(|a| AudioClip::from_payload(a).estimated_duration_ms());
        self.own_timers.schedule(
            &mut self.timers,
            now,
            self.config.quiz_explanation_delay_ms,
            TimerTask::QuizExplanation {
                text: format!("Answer: {}\n\n{}", r.correct_option, r.explanation),
                emotion,
                audio: r.audio.clone(),
            },
        );

        let follow_up = match r.next_question_index {
            Some(question_index) if r.has_next_question => {
                Some(ClientEvent::RequestNextQuizQuestion { question_index })
            }
            _ if r.is_final_result => Some(ClientEvent::RequestQuizFinalResult {
                total_correct: r.total_correct,
            }),
            _ => None,
        };
        if let Some(event) = follow_up {
            let delay = self.config.quiz_follow_up_ms(audio_ms);
            self.own_timers
                .schedule(&mut self.timers, now, delay, TimerTask::QuizFollowUp(event));
        }
    }

    fn on_quiz_final_result(&mut self, f: QuizFinalResult, now: u64) {
        self.quiz_active = false;
        self.render(MessageKind::Quiz, &f.message);
        let reason = if f.all_correct {
            EmotionReason::QuizPerfect
        } else {
            EmotionReason::QuizFinished
        };
        self.push_emotion(QUIZ_FINAL_EMOTION, f.audio.is_some(), reason, now);
        if f.audio.is_some() {
            self.begin_turn(QUIZ_FINAL_EMOTION, f.audio, now);
        }

        self.visitor.quiz_completed = true;
        self.persist_visitor();
        self.update_meter();
        if f.show_survey {
            self.effects.push(Effect::ui(UiNotice::Survey { score: f.score }));
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Run due timers; returns the clock time
    fn catch_up(&mut self) -> u64 {
        self.tick();
        self.clock.now_ms()
    }

    fn push_emotion(&mut self, emotion: &str, talking: bool, reason: EmotionReason, now: u64) -> bool {
        let conversation = self.session.active_turn().map(|t| t.to_string());
        let mut link = Link::new(&mut self.channel, &mut self.timers, now);
        self.emotions
            .push(&mut link, emotion, talking, reason, conversation.as_deref())
    }

    fn render(&mut self, kind: MessageKind, text: &str) {
        self.effects.push(Effect::ui(UiNotice::Message {
            kind,
            text: text.to_string(),
        }));
    }

    fn suggest(&mut self, items: &[String]) {
        if !items.is_empty() {
            self.effects.push(Effect::ui(UiNotice::Suggestions {
                items: items.to_vec(),
            }));
        }
    }

    fn persist_visitor(&mut self) {
        if let Err(e) = self.store.save(&self.visitor) {
            warn!(error = %e, "visitor record not saved");
        }
    }

    fn update_meter(&mut self) {
        if let Some(level) = self
            .meter
            .update(self.visitor.total_conversations, self.visitor.quiz_completed)
        {
            info!(level = level.level, name = level.name, "relationship level changed");
            if level.is_top() && !self.visitor.quiz_completed {
                self.propose_quiz_after_turn = true;
            }
            self.effects.push(Effect::ui(UiNotice::LevelChanged {
                level: level.level,
                name: level.name.to_string(),
            }));
        }
    }

    // =========================================================================
    // HOST API
    // =========================================================================

    /// Take everything produced since the last drain
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Cancel every timer and stop audio (page unload)
    pub fn teardown(&mut self) {
        self.session.teardown(&mut self.timers);
        self.intro.teardown(&mut self.timers);
        self.readiness.teardown(&mut self.timers);
        self.channel.teardown(&mut self.timers);
        self.own_timers.cancel_all(&mut self.timers);
        self.pending_start = None;
        self.pending_timer = None;
        info!(remaining = self.timers.len(), "torn down");
    }

    /// Back to `pending` introduction (test harness)
    pub fn reset_introduction(&mut self) {
        self.intro.reset(&mut self.timers);
        self.intro_turn = None;
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: Utc::now(),
            now_ms: self.clock.now_ms(),
            readiness: self.readiness.state(),
            audio_initialized: self.readiness.audio_initialized(),
            minimally_ready: self.readiness.is_minimally_ready(),
            fully_ready: self.readiness.is_fully_ready(),
            introduction: self.intro.state(),
            emotion: self.emotions.state().clone(),
            active_turn: self.session.active_turn().map(|t| t.to_string()),
            active_turn_timers: self.session.active_timer_count(),
            pending_start: self.pending_start.is_some(),
            queue_depth: self.channel.queue_len(),
            delivered: self.channel.delivered_count(),
            delivery_failures: self.channel.failure_count(),
            scheduled_timers: self.timers.len(),
            relationship_level: self.meter.current().level,
            intro_audit: self.intro.audit().cloned().collect(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn scheduled_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn emotion_state(&self) -> &EmotionState {
        self.emotions.state()
    }

    pub fn intro_state(&self) -> IntroductionState {
        self.intro.state()
    }

    pub fn intro(&self) -> &IntroductionCoordinator {
        &self.intro
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn channel(&self) -> &OutboundChannel {
        &self.channel
    }

    pub fn visitor(&self) -> &VisitRecord {
        &self.visitor
    }

    pub fn has_pending_start(&self) -> bool {
        self.pending_start.is_some()
    }

    pub fn quiz_active(&self) -> bool {
        self.quiz_active
    }
}
