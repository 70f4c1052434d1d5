//! Inbound and outbound event shapes
//!
//! - `ServerEvent`: backend → widget (socket messages)
//! - `ClientEvent`: widget → backend
//! - `RuntimeSignal`: embedded runtime → widget, after normalization
//! - `AudioEvent`: local audio element → widget

use serde::{Deserialize, Serialize};

// =============================================================================
// SERVER → WIDGET
// =============================================================================

/// A spoken assistant message (greeting, response, quiz proposal)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpokenMessage {
    pub message: String,
    pub emotion: Option<String>,
    /// Base64 audio, bare or as a data URL
    pub audio: Option<String>,
    pub suggestions: Vec<String>,
}

/// One quiz question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizQuestion {
    pub question_index: u32,
    pub question: String,
    pub options: Vec<String>,
    pub audio: Option<String>,
}

/// Verdict on one quiz answer plus what comes next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizAnswerResult {
    pub question_index: u32,
    pub is_correct: bool,
    pub correct_option: String,
    pub explanation: String,
    pub result_message: String,
    pub emotion: Option<String>,
    pub audio: Option<String>,
    pub has_next_question: bool,
    pub next_question_index: Option<u32>,
    pub is_final_result: bool,
    pub total_correct: u32,
}

/// End of the quiz
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizFinalResult {
    pub message: String,
    pub emotion: Option<String>,
    pub audio: Option<String>,
    pub all_correct: bool,
    pub show_survey: bool,
    pub score: u32,
}

/// Server-side conversation markers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationMarker {
    pub emotion: Option<String>,
}

/// Server-reported failure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerError {
    pub message: Option<String>,
}

/// Events consumed from the backend: `{"event": "<name>", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Greeting(SpokenMessage),
    Response(SpokenMessage),
    QuizProposal(SpokenMessage),
    QuizQuestion(QuizQuestion),
    QuizAnswerResult(QuizAnswerResult),
    QuizFinalResult(QuizFinalResult),
    ConversationStart(ConversationMarker),
    ConversationEnd(ConversationMarker),
    Error(ServerError),
}

impl ServerEvent {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Greeting(_) => "greeting",
            ServerEvent::Response(_) => "response",
            ServerEvent::QuizProposal(_) => "quiz_proposal",
            ServerEvent::QuizQuestion(_) => "quiz_question",
            ServerEvent::QuizAnswerResult(_) => "quiz_answer_result",
            ServerEvent::QuizFinalResult(_) => "quiz_final_result",
            ServerEvent::ConversationStart(_) => "conversation_start",
            ServerEvent::ConversationEnd(_) => "conversation_end",
            ServerEvent::Error(_) => "error",
        }
    }
}

// =============================================================================
// WIDGET → SERVER
// =============================================================================

/// Events emitted to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Audio of a turn finished (normally, by error, or by safety timeout)
    ConversationEnded { conversation_id: String },
    /// Visitor identification, sent once after connect
    VisitorInfo {
        visitor_id: String,
        visit_count: u32,
        total_conversations: u32,
    },
    RequestNextQuizQuestion { question_index: u32 },
    RequestQuizFinalResult { total_correct: u32 },
    /// Ask the backend to offer the quiz
    RequestQuizProposal,
}

// =============================================================================
// RUNTIME → WIDGET
// =============================================================================

/// Transport a runtime signal arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Callback,
    FrameMessage,
    CustomEvent,
    Polling,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalSource::Callback => "callback",
            SignalSource::FrameMessage => "frame_message",
            SignalSource::CustomEvent => "custom_event",
            SignalSource::Polling => "polling",
        };
        write!(f, "{}", name)
    }
}

/// Normalized runtime signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum RuntimeSignal {
    /// Runtime announced its instance can be acquired
    Ready,
    FullyInitialized,
    StartMotionCompleted,
    /// Only the motion named `start` carries meaning
    MotionChanged { motion: String },
    /// Runtime echoed an emotion it applied (logged only)
    EmotionEcho { emotion: String, talking: bool },
    /// Explicit runtime teardown
    Disconnected,
}

// =============================================================================
// AUDIO → WIDGET
// =============================================================================

/// Opaque reference to one playing clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioHandle(pub u64);

impl std::fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "audio#{}", self.0)
    }
}

/// Competing completion callbacks of an audio element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEventKind {
    Ended,
    Error,
}

/// Audio element callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEvent {
    pub handle: AudioHandle,
    pub kind: AudioEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_event() {
        let json = r#"{"event": "response", "data": {"message": "Hi", "emotion": "happy", "audio": "AAAA", "suggestions": ["a"]}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::Response(msg) => {
                assert_eq!(msg.message, "Hi");
                assert_eq!(msg.emotion.as_deref(), Some("happy"));
                assert_eq!(msg.audio.as_deref(), Some("AAAA"));
                assert_eq!(msg.suggestions, vec!["a".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_quiz_answer_result_camel_case() {
        let json = r#"{"event": "quiz_answer_result", "data": {
            "questionIndex": 0, "isCorrect": true, "correctOption": "B",
            "explanation": "Because", "resultMessage": "Correct!",
            "emotion": "surprise", "hasNextQuestion": true, "nextQuestionIndex": 1,
            "isFinalResult": false, "totalCorrect": 1}}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::QuizAnswerResult(result) => {
                assert!(result.is_correct);
                assert_eq!(result.next_question_index, Some(1));
                assert!(result.audio.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_client_event_wire_shape() {
        let event = ClientEvent::RequestNextQuizQuestion { question_index: 2 };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "request_next_quiz_question");
        assert_eq!(value["data"]["questionIndex"], 2);
    }

    #[test]
    fn test_quiz_proposal_request_has_no_data() {
        let value = serde_json::to_value(&ClientEvent::RequestQuizProposal).unwrap();
        assert_eq!(value, serde_json::json!({"event": "request_quiz_proposal"}));
    }
}
