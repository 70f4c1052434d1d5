//! Commands delivered to the embedded runtime

use serde::{Deserialize, Serialize};

use crate::types::EmotionReason;

/// Command kinds understood by the runtime bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Emotion,
    InitCheck,
    StatusCheck,
}

/// What a caller asks the channel to deliver. The channel stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBody {
    pub kind: CommandKind,
    pub emotion: Option<String>,
    pub talking: Option<bool>,
    pub reason: Option<EmotionReason>,
    pub conversation_id: Option<String>,
}

impl CommandBody {
    /// Emotion + talking state change
    pub fn emotion(
        emotion: impl Into<String>,
        talking: bool,
        reason: EmotionReason,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            kind: CommandKind::Emotion,
            emotion: Some(emotion.into()),
            talking: Some(talking),
            reason: Some(reason),
            conversation_id,
        }
    }

    /// Sent once right after a handle is acquired
    pub fn init_check() -> Self {
        Self::bare(CommandKind::InitCheck)
    }

    /// Periodic check until the runtime reports full initialization
    pub fn status_check() -> Self {
        Self::bare(CommandKind::StatusCheck)
    }

    fn bare(kind: CommandKind) -> Self {
        Self {
            kind,
            emotion: None,
            talking: None,
            reason: None,
            conversation_id: None,
        }
    }
}

/// A stamped command. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talking: Option<bool>,
    /// Per-channel submission order, starting at 0
    pub sequence: u64,
    /// Page session the command belongs to
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Clock milliseconds at enqueue time
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EmotionReason>,
}

impl OutboundCommand {
    /// Stamp a body
    pub fn stamp(body: CommandBody, sequence: u64, session_id: &str, timestamp: u64) -> Self {
        Self {
            kind: body.kind,
            emotion: body.emotion,
            talking: body.talking,
            sequence,
            session_id: session_id.to_string(),
            conversation_id: body.conversation_id,
            timestamp,
            reason: body.reason,
        }
    }

    /// Single-string wire payload
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a wire payload back (runtime doubles, diagnostics)
    pub fn from_payload(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}
