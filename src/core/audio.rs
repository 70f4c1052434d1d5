//! Local audio playback seam and duration estimation
//!
//! Durations are estimated from the base64 payload size alone, with fixed
//! format assumptions per encoding:
//! - WAV: 24 kHz, 16-bit, mono, 44-byte header
//! - MP3: 128 kbit/s constant bitrate

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::AudioHandle;
use crate::{
    MP3_BITRATE_BPS, WAV_BYTES_PER_SAMPLE, WAV_CHANNELS, WAV_HEADER_BYTES, WAV_SAMPLE_RATE,
};

/// MIME given to a bare base64 body when building its data URL
const BARE_PAYLOAD_MIME: &str = "audio/mp3";

lazy_static! {
    static ref RE_DATA_URL: Regex =
        Regex::new(r"^data:audio/([A-Za-z0-9.+-]+);base64,").unwrap();
}

/// Playback failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    #[error("audio payload is empty or undecodable")]
    Undecodable,

    #[error("playback refused: {0}")]
    PlaybackRefused(String),
}

/// Encoding inferred from the payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Wav,
    Mp3,
}

impl AudioEncoding {
    fn from_subtype(subtype: &str) -> Self {
        match subtype.to_ascii_lowercase().as_str() {
            "mpeg" | "mp3" | "mpeg3" | "x-mpeg-3" => AudioEncoding::Mp3,
            _ => AudioEncoding::Wav,
        }
    }
}

/// A response's audio, ready to hand to an `AudioSink`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Playable data URL
    pub source: String,
    pub encoding: AudioEncoding,
    /// Length of the base64 body in characters
    pub base64_len: usize,
}

impl AudioClip {
    /// Accepts a data URL or a bare base64 body. A bare body plays as
    /// `audio/mp3` but its duration is estimated with the WAV model.
    pub fn from_payload(raw: &str) -> Self {
        let raw = raw.trim();
        match RE_DATA_URL.captures(raw) {
            Some(caps) => {
                let encoding = AudioEncoding::from_subtype(&caps[1]);
                let header_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
                Self {
                    source: raw.to_string(),
                    encoding,
                    base64_len: raw.len() - header_len,
                }
            }
            None => Self {
                source: format!("data:{};base64,{}", BARE_PAYLOAD_MIME, raw),
                encoding: AudioEncoding::Wav,
                base64_len: raw.len(),
            },
        }
    }

    /// Decoded byte count implied by the base64 length
    pub fn byte_len(&self) -> u64 {
        (self.base64_len as u64 * 3) / 4
    }

    /// Estimated playback duration
    pub fn estimated_duration_ms(&self) -> u64 {
        let bytes = self.byte_len();
        match self.encoding {
            AudioEncoding::Wav => {
                let per_second = WAV_SAMPLE_RATE * WAV_BYTES_PER_SAMPLE * WAV_CHANNELS;
                bytes.saturating_sub(WAV_HEADER_BYTES) * 1000 / per_second
            }
            AudioEncoding::Mp3 => bytes * 8 * 1000 / MP3_BITRATE_BPS,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base64_len == 0
    }
}

/// Local audio output. Completion arrives later as an `AudioEvent`.
pub trait AudioSink: Send {
    /// Start playing; the returned handle identifies later events
    fn play(&mut self, clip: &AudioClip) -> Result<AudioHandle, AudioError>;

    /// Stop and rewind. Unknown or finished handles are ignored.
    fn stop(&mut self, handle: AudioHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base64_of_bytes(bytes: usize) -> String {
        "A".repeat(bytes * 4 / 3)
    }

    #[test]
    fn test_bare_payload_plays_as_mp3_but_estimates_as_wav() {
        let clip = AudioClip::from_payload("AAAA");
        assert_eq!(clip.encoding, AudioEncoding::Wav);
        assert!(clip.source.starts_with("data:audio/mp3;base64,"));
        assert_eq!(clip.base64_len, 4);
    }

    #[test]
    fn test_data_url_mp3_detected() {
        let clip = AudioClip::from_payload("data:audio/mpeg;base64,AAAAAAAA");
        assert_eq!(clip.encoding, AudioEncoding::Mp3);
        assert_eq!(clip.base64_len, 8);
    }

    #[test]
    fn test_wav_estimate_one_second() {
        // Header plus just over one second at 24 kHz 16-bit mono
        let clip = AudioClip::from_payload(&base64_of_bytes(48_048));
        assert_eq!(clip.estimated_duration_ms(), 1000);
    }

    #[test]
    fn test_mp3_estimate_one_second() {
        let body = base64_of_bytes(16_002);
        let clip = AudioClip::from_payload(&format!("data:audio/mp3;base64,{}", body));
        assert_eq!(clip.estimated_duration_ms(), 1000);
    }

    #[test]
    fn test_tiny_wav_is_zero_not_negative() {
        let clip = AudioClip::from_payload("AAAA");
        assert_eq!(clip.estimated_duration_ms(), 0);
    }
}
