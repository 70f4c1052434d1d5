//! Core types for Avatar Sync

mod command;
mod effect;
mod emotion;
mod events;
mod intro;
mod output;
mod readiness;
mod reason;

pub use command::{CommandBody, CommandKind, OutboundCommand};
pub use effect::{Effect, MessageKind, UiNotice};
pub use emotion::EmotionState;
pub use events::{
    AudioEvent, AudioEventKind, AudioHandle, ClientEvent, ConversationMarker, QuizAnswerResult,
    QuizFinalResult, QuizQuestion, RuntimeSignal, ServerError, ServerEvent, SignalSource,
    SpokenMessage,
};
pub use intro::{AuditEntry, AuditOutcome, IntroPayload, IntroductionState, RejectReason};
pub use output::StatusSnapshot;
pub use readiness::{ConnectionStatus, ReadinessState, ReadinessTransition};
pub use reason::EmotionReason;
