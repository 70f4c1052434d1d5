//! Integration tests for conversation turns driven through the orchestrator
//!
//! - superseding a turn cancels its timers
//! - stalled audio is ended by the safety timer exactly once
//! - a response arriving before the runtime is ready starts exactly once

mod common;

use pretty_assertions::assert_eq;

use avatar_sync::core::AudioClip;
use avatar_sync::types::{AudioEvent, AudioEventKind, EmotionReason, ServerError, ServerEvent, UiNotice};
use common::{conversation_ended, notices, response, wav_seconds, Harness};

fn ready_harness() -> Harness {
    let mut h = Harness::new();
    h.make_ready();
    h.advance(3_000);
    h.take_effects();
    h
}

// =============================================================================
// SUPERSEDE
// =============================================================================

#[test]
fn test_supersede_leaves_one_turn_and_no_leaked_timers() {
    let mut h = ready_harness();
    let baseline = h.core.scheduled_timers();

    h.server(response("first", "happy", Some(wav_seconds(10))));
    let first = h.core.session().audio_handle().unwrap();
    assert_eq!(h.core.session().active_timer_count(), 1);

    h.advance(500);
    h.server(response("second", "surprised", Some(wav_seconds(10))));
    assert!(h.core.session().is_active());
    assert_eq!(h.core.session().active_timer_count(), 1);
    assert_eq!(h.audio.stops(), vec![first]);
    assert_ne!(h.core.session().audio_handle(), Some(first));

    h.audio_event(AudioEventKind::Ended);
    assert!(!h.core.session().is_active());
    h.advance(1_000);

    assert_eq!(h.core.scheduled_timers(), baseline);
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

#[test]
fn test_superseded_audio_completion_is_ignored() {
    let mut h = ready_harness();
    h.server(response("first", "happy", Some(wav_seconds(10))));
    let first = h.core.session().audio_handle().unwrap();
    h.server(response("second", "happy", Some(wav_seconds(10))));

    h.core.handle_audio_event(AudioEvent {
        handle: first,
        kind: AudioEventKind::Ended,
    });
    assert!(h.core.session().is_active());
    assert_eq!(conversation_ended(&h.take_effects()), 0);
}

// =============================================================================
// AUDIO COMPLETION PATHS
// =============================================================================

#[test]
fn test_safety_timeout_ends_stalled_audio_once() {
    let mut h = ready_harness();
    h.server(response("stalled", "happy", Some(wav_seconds(10))));
    let handle = h.core.session().audio_handle().unwrap();

    h.advance(59_999);
    assert!(h.core.session().is_active());

    h.advance(1);
    assert!(!h.core.session().is_active());

    // Late callbacks for the same clip change nothing
    h.core.handle_audio_event(AudioEvent {
        handle,
        kind: AudioEventKind::Ended,
    });
    h.core.handle_audio_event(AudioEvent {
        handle,
        kind: AudioEventKind::Error,
    });
    h.advance(5_000);

    assert_eq!(conversation_ended(&h.take_effects()), 1);
    assert_eq!(h.emotions_with(EmotionReason::TurnEnd).len(), 1);
}

#[test]
fn test_safety_timeout_scales_with_long_audio() {
    let mut h = ready_harness();
    let audio = wav_seconds(70);
    let safety = AudioClip::from_payload(&audio).estimated_duration_ms() + 5_000;
    assert!(safety > 60_000);

    h.server(response("long", "happy", Some(audio)));
    h.advance(safety - 1);
    assert!(h.core.session().is_active());
    h.advance(1);
    assert!(!h.core.session().is_active());
}

#[test]
fn test_audio_ended_notifies_server_once() {
    let mut h = ready_harness();
    h.server(response("hello", "happy", Some(wav_seconds(3))));
    h.advance(3_000);
    h.audio_event(AudioEventKind::Ended);
    h.audio_event(AudioEventKind::Ended);
    h.advance(70_000);

    assert_eq!(conversation_ended(&h.take_effects()), 1);
    assert_eq!(h.emotions_with(EmotionReason::TurnStart).len(), 1);
    assert_eq!(h.emotions_with(EmotionReason::TurnEnd).len(), 1);
}

#[test]
fn test_audio_error_ends_after_grace() {
    let mut h = ready_harness();
    h.server(response("broken", "sad", Some(wav_seconds(10))));
    h.audio_event(AudioEventKind::Error);

    h.advance(1_999);
    assert!(h.core.session().is_active());
    h.advance(1);
    assert!(!h.core.session().is_active());

    h.advance(70_000);
    assert_eq!(conversation_ended(&h.take_effects()), 1);
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

#[test]
fn test_refused_playback_still_returns_to_neutral() {
    let mut h = ready_harness();
    h.audio.refuse_next_play();
    h.server(response("blocked", "happy", Some(wav_seconds(5))));
    assert!(h.core.session().audio_handle().is_none());

    h.advance(2_000);
    assert!(!h.core.session().is_active());
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

#[test]
fn test_text_turn_uses_fallback_and_stays_silent_to_server() {
    let mut h = ready_harness();
    h.server(response("just text", "happy", None));
    assert_eq!(h.last_emotion(), Some(("happy".to_string(), true)));

    h.advance(2_999);
    assert!(h.core.session().is_active());
    h.advance(1);
    assert!(!h.core.session().is_active());

    h.advance(1_000);
    assert_eq!(conversation_ended(&h.take_effects()), 0);
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

#[test]
fn test_server_error_interrupts_turn() {
    let mut h = ready_harness();
    h.server(response("hello", "happy", Some(wav_seconds(10))));
    h.server(ServerEvent::Error(ServerError {
        message: Some("backend down".to_string()),
    }));

    assert!(!h.core.session().is_active());
    h.advance(1_000);
    let effects = h.take_effects();
    assert_eq!(conversation_ended(&effects), 0);
    assert!(notices(&effects)
        .iter()
        .any(|n| matches!(n, UiNotice::Error { text } if text == "backend down")));
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

// =============================================================================
// PENDING START
// =============================================================================

#[test]
fn test_pending_response_executes_once_after_readiness() {
    let mut h = Harness::new();
    h.connect();
    h.advance(100);

    h.server(response("early", "happy", Some(wav_seconds(5))));
    assert!(h.core.has_pending_start());
    assert!(h.emotions_with(EmotionReason::TurnStart).is_empty());
    assert!(h.audio.plays().is_empty());

    h.advance(200);
    h.frame("runtime-fully-initialized");
    assert!(h.core.has_pending_start());
    h.frame("start-motion-completed");
    assert!(!h.core.has_pending_start());
    assert_eq!(h.audio.plays().len(), 1);

    // Duplicates from other transports
    h.frame("unity-fully-initialized");
    h.frame("start-motion-completed");
    assert!(h.core.handle_frame_message(&serde_json::json!({"type": "motion-changed", "motion": "start"})));
    h.advance(15_000);
    assert_eq!(h.audio.plays().len(), 1);

    h.audio_event(AudioEventKind::Ended);
    h.advance(1_000);

    assert_eq!(h.emotions_with(EmotionReason::TurnStart).len(), 1);
    assert_eq!(h.emotions_with(EmotionReason::TurnEnd).len(), 1);
    assert_eq!(h.last_emotion(), Some(("neutral".to_string(), false)));
}

#[test]
fn test_latest_pending_response_wins() {
    let mut h = Harness::new();
    h.connect();
    h.server(response("first", "happy", Some(wav_seconds(5))));
    h.server(response("second", "sad", Some(wav_seconds(5))));

    h.frame("start-motion-completed");
    let starts = h.emotions_with(EmotionReason::TurnStart);
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].emotion.as_deref(), Some("sad"));
}

#[test]
fn test_pending_response_starts_once_when_watchdog_and_timeout_race() {
    let mut h = Harness::new();
    h.connect();
    h.advance(100);
    h.server(response("early", "happy", Some(wav_seconds(5))));

    h.advance(12_000);
    assert!(!h.core.has_pending_start());
    assert_eq!(h.audio.plays().len(), 1);
    assert_eq!(h.emotions_with(EmotionReason::TurnStart).len(), 1);
}

// =============================================================================
// TEARDOWN
// =============================================================================

#[test]
fn test_teardown_cancels_every_timer() {
    let mut h = ready_harness();
    h.server(response("hello", "happy", Some(wav_seconds(10))));
    h.core.teardown();

    assert_eq!(h.core.scheduled_timers(), 0);
    assert!(!h.core.session().is_active());
    assert_eq!(h.audio.stops().len(), 1);
}
