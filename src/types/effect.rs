//! Effects the core asks its host to carry out

use serde::{Deserialize, Serialize};

use crate::types::ClientEvent;

/// Where a rendered message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Greeting,
    Response,
    Quiz,
}

/// Presentation requests (DOM rendering is the host's job)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum UiNotice {
    Message { kind: MessageKind, text: String },
    Suggestions { items: Vec<String> },
    /// Transient, user-visible, never fatal
    Error { text: String },
    LevelChanged { level: u8, name: String },
    QuizChoices,
    QuizOptions { question_index: u32, options: Vec<String> },
    Survey { score: u32 },
}

/// Host-side work produced by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Effect {
    Server { event: ClientEvent },
    Ui { notice: UiNotice },
}

impl Effect {
    pub fn server(event: ClientEvent) -> Self {
        Effect::Server { event }
    }

    pub fn ui(notice: UiNotice) -> Self {
        Effect::Ui { notice }
    }

    /// The outbound server event, if this is one
    pub fn as_server(&self) -> Option<&ClientEvent> {
        match self {
            Effect::Server { event } => Some(event),
            Effect::Ui { .. } => None,
        }
    }
}
