//! Integration tests for emotion filtering and outbound delivery
//!
//! - boundary pushes bypass debounce
//! - identical pushes inside the debounce window deliver once
//! - a failed delivery is retried before anything queued after it

use pretty_assertions::assert_eq;

use avatar_sync::config::SyncConfig;
use avatar_sync::core::{EmotionSynchronizer, Link, OutboundChannel, SimulatedRuntime, TimerTable};
use avatar_sync::types::{CommandBody, CommandKind, EmotionReason};

struct Rig {
    runtime: SimulatedRuntime,
    channel: OutboundChannel,
    table: TimerTable,
    sync: EmotionSynchronizer,
}

fn rig() -> Rig {
    let config = SyncConfig::default();
    let runtime = SimulatedRuntime::new();
    Rig {
        channel: OutboundChannel::new(runtime.host(), &config, "page_test"),
        runtime,
        table: TimerTable::new(),
        sync: EmotionSynchronizer::new(&config),
    }
}

impl Rig {
    fn push(&mut self, at: u64, emotion: &str, talking: bool, reason: EmotionReason) -> bool {
        let mut link = Link::new(&mut self.channel, &mut self.table, at);
        self.sync.push(&mut link, emotion, talking, reason, None)
    }

    /// Fire channel timers up to `until`
    fn drain(&mut self, until: u64) {
        while let Some(due) = self.table.next_due() {
            if due > until {
                break;
            }
            let Some((id, _)) = self.table.pop_due(due) else { break };
            self.channel.on_timer(id, due, &mut self.table);
        }
    }

    fn delivered_emotions(&self) -> Vec<(String, bool)> {
        self.runtime
            .emotion_commands()
            .into_iter()
            .filter_map(|c| Some((c.emotion?, c.talking?)))
            .collect()
    }
}

// =============================================================================
// DEBOUNCE AND BOUNDARIES
// =============================================================================

#[test]
fn test_boundary_delivered_inside_debounce_window() {
    let mut rig = rig();
    assert!(rig.push(1000, "happy", true, EmotionReason::Manual));
    assert!(rig.push(1010, "neutral", false, EmotionReason::TurnEnd));
    assert!(rig.push(1020, "sad", true, EmotionReason::TurnStart));
    rig.drain(2000);

    assert_eq!(
        rig.delivered_emotions(),
        vec![
            ("happy".to_string(), true),
            ("neutral".to_string(), false),
            ("sad".to_string(), true),
        ]
    );
}

#[test]
fn test_identical_pushes_in_window_deliver_once() {
    let mut rig = rig();
    for offset in [0, 20, 40, 60, 80] {
        rig.push(500 + offset, "happy", true, EmotionReason::Manual);
    }
    rig.drain(2000);

    assert_eq!(rig.delivered_emotions(), vec![("happy".to_string(), true)]);
    assert_eq!(rig.sync.delivered_count(), 1);
    assert_eq!(rig.sync.rejected_count(), 4);
}

#[test]
fn test_unchanged_state_rejected_after_window_unless_forced() {
    let mut rig = rig();
    assert!(rig.push(0, "neutral", false, EmotionReason::Initialization));
    assert!(!rig.push(500, "neutral", false, EmotionReason::EnsureNeutral));
    assert!(rig.push(1000, "neutral", false, EmotionReason::ForceNeutral));
}

#[test]
fn test_rejected_push_keeps_recorded_state() {
    let mut rig = rig();
    rig.push(0, "happy", true, EmotionReason::Manual);
    rig.push(50, "angry", true, EmotionReason::Manual);

    assert_eq!(rig.sync.state().emotion, "happy");
    assert_eq!(rig.sync.state().last_change_ms, Some(0));
}

#[test]
fn test_push_without_runtime_is_not_recorded() {
    let config = SyncConfig::default();
    let runtime = SimulatedRuntime::unavailable();
    let mut channel = OutboundChannel::new(runtime.host(), &config, "page_test");
    let mut table = TimerTable::new();
    let mut sync = EmotionSynchronizer::new(&config);

    let mut link = Link::new(&mut channel, &mut table, 0);
    assert!(!sync.push(&mut link, "happy", true, EmotionReason::TurnStart, None));
    assert!(sync.is_neutral());
    assert_eq!(sync.state().last_change_ms, None);
}

// =============================================================================
// DELIVERY ORDER
// =============================================================================

#[test]
fn test_failed_first_command_retried_before_later_ones() {
    let mut rig = rig();
    rig.runtime.fail_next(1);

    for (emotion, at) in [("c1", 0), ("c2", 1), ("c3", 2)] {
        let body = CommandBody::emotion(emotion, true, EmotionReason::TurnStart, None);
        assert!(rig.channel.enqueue(body, at, &mut rig.table));
    }
    rig.drain(5_000);

    let attempts: Vec<(String, bool)> = rig
        .runtime
        .attempts()
        .iter()
        .filter_map(|a| Some((a.command()?.emotion?, a.delivered)))
        .collect();
    assert_eq!(
        attempts,
        vec![
            ("c1".to_string(), false),
            ("c1".to_string(), true),
            ("c2".to_string(), true),
            ("c3".to_string(), true),
        ]
    );

    let sequences: Vec<u64> = rig.runtime.delivered().iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(rig.channel.failure_count(), 1);
    assert_eq!(rig.channel.queue_len(), 0);
}

#[test]
fn test_retry_waits_for_backoff() {
    let mut rig = rig();
    rig.runtime.fail_next(1);
    rig.channel
        .enqueue(CommandBody::init_check(), 0, &mut rig.table);

    rig.drain(999);
    assert!(rig.runtime.delivered().is_empty());

    rig.drain(1000);
    let delivered = rig.runtime.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, CommandKind::InitCheck);
}

#[test]
fn test_deliveries_respect_minimum_spacing() {
    let mut rig = rig();
    for at in 0..3 {
        rig.channel
            .enqueue(CommandBody::status_check(), at, &mut rig.table);
    }
    rig.drain(59);
    assert_eq!(rig.runtime.delivered().len(), 2);
    rig.drain(60);
    assert_eq!(rig.runtime.delivered().len(), 3);
}
