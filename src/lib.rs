//! Avatar Sync: cross-runtime synchronization core for an avatar chat widget
//!
//! Reconciles three asynchronous timelines (server message events, embedded
//! runtime readiness/motion events, local audio playback) into one ordered
//! presentation sequence. The avatar must always return to neutral, and the
//! introduction must never run twice.

pub mod config;
pub mod core;
pub mod types;

// =============================================================================
// RUNTIME READINESS
// =============================================================================

/// Interval between runtime handle acquisition polls (milliseconds)
pub const RUNTIME_POLL_INTERVAL_MS: u64 = 2000;

/// Acquisition polls before the attempt counter is reset
pub const RUNTIME_ACQUIRE_MAX_ATTEMPTS: u32 = 10;

/// Interval between `status_check` commands after acquisition (milliseconds)
pub const STATUS_CHECK_INTERVAL_MS: u64 = 500;

/// Unanswered status checks before initialization is assumed
pub const STATUS_CHECK_MAX: u32 = 20;

/// Start motion is assumed complete this long after full initialization
pub const START_MOTION_FALLBACK_MS: u64 = 3500;

// =============================================================================
// OUTBOUND CHANNEL
// =============================================================================

/// Minimum spacing between two deliveries (milliseconds)
pub const CHANNEL_MIN_SPACING_MS: u64 = 30;

/// Backoff after a failed delivery (milliseconds)
pub const CHANNEL_RETRY_BACKOFF_MS: u64 = 1000;

/// Wait before retrying when no handle could be acquired (milliseconds)
pub const CHANNEL_HANDLE_WAIT_MS: u64 = 500;

/// Runtime-side receiver object name
pub const BRIDGE_OBJECT: &str = "WebGLBridge";

/// Runtime-side receiver method name
pub const BRIDGE_METHOD: &str = "OnMessage";

// =============================================================================
// EMOTION + TURNS
// =============================================================================

/// Non-boundary emotion pushes closer than this are dropped (milliseconds)
pub const EMOTION_DEBOUNCE_MS: u64 = 100;

/// Emotion the avatar rests in between turns
pub const NEUTRAL_EMOTION: &str = "neutral";

/// Turn length when a response carries no audio (milliseconds)
pub const TEXT_TURN_FALLBACK_MS: u64 = 3000;

/// Added to the estimated audio duration for the safety timer (milliseconds)
pub const AUDIO_SAFETY_BUFFER_MS: u64 = 5000;

/// Lower bound of the audio safety timer (milliseconds)
pub const AUDIO_SAFETY_FLOOR_MS: u64 = 60000;

/// Delay between an audio error and the forced turn end (milliseconds)
pub const AUDIO_ERROR_GRACE_MS: u64 = 2000;

/// First neutral confirmation after a turn end (milliseconds)
pub const NEUTRAL_CONFIRM_FIRST_MS: u64 = 100;

/// Second, conditional neutral confirmation after a turn end (milliseconds)
pub const NEUTRAL_CONFIRM_SECOND_MS: u64 = 500;

// =============================================================================
// INTRODUCTION + PENDING STARTS
// =============================================================================

/// Minimum interval between two accepted introduction requests (milliseconds)
pub const INTRO_COOLDOWN_MS: u64 = 3000;

/// Delay between entering `running` and starting the introduction turn
pub const INTRO_LAUNCH_DELAY_MS: u64 = 200;

/// Pending introductions and turns are forced after this wait (milliseconds)
pub const PENDING_START_TIMEOUT_MS: u64 = 10000;

/// Maximum retained introduction audit entries
pub const INTRO_AUDIT_CAPACITY: usize = 256;

// =============================================================================
// SERVER-FACING
// =============================================================================

/// Visitor info is sent this long after the socket connects (milliseconds)
pub const VISITOR_INFO_DELAY_MS: u64 = 2000;

/// Quiz explanation follows the answer result after this delay (milliseconds)
pub const QUIZ_EXPLANATION_DELAY_MS: u64 = 1000;

/// Minimum wait before requesting the next quiz step (milliseconds)
pub const QUIZ_FOLLOW_UP_MIN_MS: u64 = 3000;

/// Slack added to the answer audio before requesting the next step
pub const QUIZ_FOLLOW_UP_SLACK_MS: u64 = 2000;

/// Quiz proposal is requested this long after the turn that follows the
/// meter reaching its top level (milliseconds)
pub const QUIZ_PROPOSAL_REQUEST_DELAY_MS: u64 = 1000;

// =============================================================================
// AUDIO ESTIMATION
// =============================================================================

/// WAV sample rate assumed for duration estimates
pub const WAV_SAMPLE_RATE: u64 = 24000;

/// WAV bytes per sample (16-bit)
pub const WAV_BYTES_PER_SAMPLE: u64 = 2;

/// WAV channel count (mono)
pub const WAV_CHANNELS: u64 = 1;

/// WAV header bytes excluded from the estimate
pub const WAV_HEADER_BYTES: u64 = 44;

/// MP3 bitrate assumed for duration estimates (bits per second)
pub const MP3_BITRATE_BPS: u64 = 128_000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
