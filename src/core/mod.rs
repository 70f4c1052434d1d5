//! Core modules for Avatar Sync

pub mod api;
pub mod audio;
pub mod channel;
pub mod clock;
pub mod emotion;
pub mod intro;
pub mod orchestrator;
pub mod readiness;
pub mod relationship;
pub mod script;
pub mod session;
pub mod signals;
pub mod simulated;
pub mod timers;
pub mod visitor;

pub use api::{create_router, run_server, AppState, BridgeRuntime};
pub use audio::{AudioClip, AudioEncoding, AudioError, AudioSink};
pub use channel::{DeliveryError, OutboundChannel, RuntimeEndpoint, RuntimeHost};
pub use clock::{Clock, ManualClock, SystemClock};
pub use emotion::{EmotionSynchronizer, Link};
pub use intro::{IntroductionCoordinator, ReadinessView};
pub use orchestrator::Orchestrator;
pub use readiness::ReadinessTracker;
pub use relationship::{level_for, progress_percent, Level, RelationshipMeter};
pub use script::{load_script, parse_script, CallbackStep, ScriptAction, ScriptError, ScriptRunner, ScriptStep, TraceEntry};
pub use session::{ConversationSession, EndCause, TurnEnded, TurnId};
pub use signals::Normalized;
pub use simulated::{DeliveryAttempt, SimulatedAudio, SimulatedRuntime};
pub use timers::{TimerId, TimerScope, TimerTable, TimerTask};
pub use visitor::{JsonFileStore, MemoryStore, StoreError, VisitRecord, VisitorStore};
