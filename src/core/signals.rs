//! Runtime signal normalization
//!
//! Readiness arrives over several transports (frame messages, in-process
//! callbacks, custom events, polling). Each is mapped here to one
//! `RuntimeSignal`, tagged with where it came from, before dispatch.

use serde_json::Value;

use crate::types::{RuntimeSignal, SignalSource};

/// A normalized signal and its transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub signal: RuntimeSignal,
    pub source: SignalSource,
}

impl Normalized {
    fn new(signal: RuntimeSignal, source: SignalSource) -> Self {
        Self { signal, source }
    }
}

/// Map a signal name shared by every transport. Both the `runtime-` and the
/// legacy `unity-` spellings are accepted.
fn by_name(name: &str) -> Option<RuntimeSignal> {
    let name = name.trim();
    let stem = name
        .strip_prefix("runtime-")
        .or_else(|| name.strip_prefix("unity-"))
        .unwrap_or(name);
    match stem {
        "ready" => Some(RuntimeSignal::Ready),
        "fully-initialized" => Some(RuntimeSignal::FullyInitialized),
        "start-motion-completed" => Some(RuntimeSignal::StartMotionCompleted),
        "disconnected" => Some(RuntimeSignal::Disconnected),
        _ => None,
    }
}

/// Frame message: `{"type": "<name>", ...}`. Unknown or malformed → `None`.
pub fn from_frame_message(message: &Value) -> Option<Normalized> {
    let kind = message.get("type")?.as_str()?;
    let signal = match kind {
        "motion-changed" => RuntimeSignal::MotionChanged {
            motion: message
                .get("motion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        "runtime-emotion-change" | "unity-emotion-change" => RuntimeSignal::EmotionEcho {
            emotion: message
                .get("emotion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            talking: message
                .get("isTalking")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        other => by_name(other)?,
    };
    Some(Normalized::new(signal, SignalSource::FrameMessage))
}

/// In-process callback invoked by the runtime with a name and optional argument
pub fn from_callback(name: &str, argument: Option<&str>) -> Option<Normalized> {
    let signal = match name {
        "motion-changed" => RuntimeSignal::MotionChanged {
            motion: argument.unwrap_or_default().to_string(),
        },
        other => by_name(other)?,
    };
    Some(Normalized::new(signal, SignalSource::Callback))
}

/// Window custom event (`RuntimeReady`, `UnityReady`, ...)
pub fn from_custom_event(name: &str) -> Option<Normalized> {
    let signal = match name {
        "RuntimeReady" | "UnityReady" => RuntimeSignal::Ready,
        "RuntimeFullyInitialized" | "UnityFullyInitialized" => RuntimeSignal::FullyInitialized,
        "StartMotionCompleted" => RuntimeSignal::StartMotionCompleted,
        _ => return None,
    };
    Some(Normalized::new(signal, SignalSource::CustomEvent))
}

/// Does this signal complete the start motion?
pub fn completes_start_motion(signal: &RuntimeSignal) -> bool {
    match signal {
        RuntimeSignal::StartMotionCompleted => true,
        RuntimeSignal::MotionChanged { motion } => motion == "start",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_aliases_map_to_same_signal() {
        let a = from_frame_message(&json!({"type": "runtime-fully-initialized"})).unwrap();
        let b = from_frame_message(&json!({"type": "unity-fully-initialized"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.signal, RuntimeSignal::FullyInitialized);
        assert_eq!(a.source, SignalSource::FrameMessage);
    }

    #[test]
    fn test_motion_changed_start_completes() {
        let n = from_frame_message(&json!({"type": "motion-changed", "motion": "start"})).unwrap();
        assert!(completes_start_motion(&n.signal));

        let n = from_frame_message(&json!({"type": "motion-changed", "motion": "wave"})).unwrap();
        assert!(!completes_start_motion(&n.signal));
    }

    #[test]
    fn test_emotion_echo_fields() {
        let n = from_frame_message(&json!({
            "type": "runtime-emotion-change", "emotion": "happy", "isTalking": true
        }))
        .unwrap();
        assert_eq!(
            n.signal,
            RuntimeSignal::EmotionEcho {
                emotion: "happy".to_string(),
                talking: true
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed_ignored() {
        assert!(from_frame_message(&json!({"type": "something-else"})).is_none());
        assert!(from_frame_message(&json!({"kind": "runtime-ready"})).is_none());
        assert!(from_frame_message(&json!("runtime-ready")).is_none());
        assert!(from_custom_event("Resize").is_none());
    }

    #[test]
    fn test_transports_tagged() {
        assert_eq!(from_callback("runtime-ready", None).unwrap().source, SignalSource::Callback);
        assert_eq!(from_custom_event("UnityReady").unwrap().source, SignalSource::CustomEvent);
    }
}
