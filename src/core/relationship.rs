//! Relationship meter
//!
//! Level by completed conversation count; completing the quiz jumps to the
//! special `Master` level regardless of count.

use serde::Serialize;

/// One meter level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Level {
    pub level: u8,
    pub name: &'static str,
    pub min_conversations: u32,
}

const LEVELS: [Level; 5] = [
    Level { level: 0, name: "-", min_conversations: 0 },
    Level { level: 1, name: "Level 1", min_conversations: 2 },
    Level { level: 2, name: "Level 2", min_conversations: 4 },
    Level { level: 3, name: "Level 3", min_conversations: 6 },
    Level { level: 4, name: "MAX", min_conversations: 8 },
];

/// Reached only by completing the quiz
pub const MASTER: Level = Level {
    level: 5,
    name: "Master",
    min_conversations: u32::MAX,
};

/// Level for a conversation count
pub fn level_for(conversations: u32, quiz_completed: bool) -> Level {
    if quiz_completed {
        return MASTER;
    }
    LEVELS
        .iter()
        .rev()
        .find(|l| conversations >= l.min_conversations)
        .copied()
        .unwrap_or(LEVELS[0])
}

/// Progress towards the next level, 0-100
pub fn progress_percent(conversations: u32, quiz_completed: bool) -> u8 {
    let current = level_for(conversations, quiz_completed);
    let next = LEVELS.iter().find(|l| l.level == current.level + 1);
    match next {
        Some(next) => {
            let span = next.min_conversations - current.min_conversations;
            let done = conversations - current.min_conversations;
            ((done * 100) / span).min(100) as u8
        }
        None => 100,
    }
}

impl Level {
    /// Highest level reachable by conversations alone
    pub fn is_top(&self) -> bool {
        self.level == LEVELS[LEVELS.len() - 1].level
    }
}

/// Tracks the last level shown so changes are reported once
#[derive(Debug, Clone)]
pub struct RelationshipMeter {
    current: Level,
}

impl RelationshipMeter {
    pub fn new(conversations: u32, quiz_completed: bool) -> Self {
        Self {
            current: level_for(conversations, quiz_completed),
        }
    }

    /// Recompute; returns the new level only if it changed
    pub fn update(&mut self, conversations: u32, quiz_completed: bool) -> Option<Level> {
        let level = level_for(conversations, quiz_completed);
        if level == self.current {
            return None;
        }
        self.current = level;
        Some(level)
    }

    pub fn current(&self) -> Level {
        self.current
    }
}
