//! Reasons attached to every emotion push
//!
//! The reason decides which filters a push passes through: boundary reasons
//! skip debounce and idempotence, force-override reasons skip idempotence
//! only.

use serde::{Deserialize, Serialize};

/// Why an emotion change was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionReason {
    // =========================================================================
    // Boundaries
    // =========================================================================
    /// A turn began
    TurnStart,
    /// A turn ended
    TurnEnd,

    // =========================================================================
    // Recovery
    // =========================================================================
    /// First neutral confirmation after a turn end
    EnsureNeutral,
    /// Second neutral confirmation, sent only if the avatar is still not neutral
    ForceNeutral,
    /// Server reported an error
    Emergency,

    // =========================================================================
    // Runtime lifecycle
    // =========================================================================
    /// Neutral pose sent right after the runtime handle is first acquired
    Initialization,

    // =========================================================================
    // Server-driven
    // =========================================================================
    /// Greeting without audio
    GreetingTextOnly,
    /// Server announced a conversation start
    ServerTurnStart,
    /// Server announced a conversation end
    ServerTurnEnd,
    /// Quiz proposal shown
    QuizProposal,
    /// Quiz question shown
    QuizQuestion,
    /// Quiz answer result shown
    QuizResult,
    /// Quiz finished with at least one wrong answer
    QuizFinished,
    /// Quiz finished with every answer correct
    QuizPerfect,

    /// Anything else
    Manual,
}

impl EmotionReason {
    /// Turn boundaries are authoritative and never filtered
    pub fn is_boundary(&self) -> bool {
        matches!(self, Self::TurnStart | Self::TurnEnd)
    }

    /// Force-override reasons repeat an unchanged state but still respect debounce
    pub fn is_force_override(&self) -> bool {
        matches!(self, Self::ForceNeutral | Self::Initialization)
    }

    /// Get the code string (wire + logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::TurnStart => "turn_start",
            Self::TurnEnd => "turn_end",
            Self::EnsureNeutral => "ensure_neutral",
            Self::ForceNeutral => "force_neutral",
            Self::Emergency => "emergency",
            Self::Initialization => "initialization",
            Self::GreetingTextOnly => "greeting_text_only",
            Self::ServerTurnStart => "server_turn_start",
            Self::ServerTurnEnd => "server_turn_end",
            Self::QuizProposal => "quiz_proposal",
            Self::QuizQuestion => "quiz_question",
            Self::QuizResult => "quiz_result",
            Self::QuizFinished => "quiz_finished",
            Self::QuizPerfect => "quiz_perfect",
            Self::Manual => "manual",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::TurnStart => "Turn started",
            Self::TurnEnd => "Turn ended",
            Self::EnsureNeutral => "Confirming neutral after turn end",
            Self::ForceNeutral => "Avatar still not neutral, forcing",
            Self::Emergency => "Server error, returning to neutral",
            Self::Initialization => "Runtime handle acquired",
            Self::GreetingTextOnly => "Greeting without audio",
            Self::ServerTurnStart => "Server conversation start",
            Self::ServerTurnEnd => "Server conversation end",
            Self::QuizProposal => "Quiz proposal",
            Self::QuizQuestion => "Quiz question",
            Self::QuizResult => "Quiz answer result",
            Self::QuizFinished => "Quiz finished",
            Self::QuizPerfect => "Quiz finished, all correct",
            Self::Manual => "Manual change",
        }
    }
}

impl std::fmt::Display for EmotionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_turn_reasons_are_boundaries() {
        assert!(EmotionReason::TurnStart.is_boundary());
        assert!(EmotionReason::TurnEnd.is_boundary());
        assert!(!EmotionReason::ServerTurnStart.is_boundary());
        assert!(!EmotionReason::ForceNeutral.is_boundary());
    }

    #[test]
    fn test_force_neutral_is_override_not_boundary() {
        assert!(EmotionReason::ForceNeutral.is_force_override());
        assert!(!EmotionReason::EnsureNeutral.is_force_override());
    }

    #[test]
    fn test_code_matches_serde_name() {
        let json = serde_json::to_string(&EmotionReason::GreetingTextOnly).unwrap();
        assert_eq!(json, format!("\"{}\"", EmotionReason::GreetingTextOnly.code()));
    }
}
