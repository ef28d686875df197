//! Chunk metadata records.
//!
//! A chunk is published as two files: the raw PCM samples and this metadata
//! record naming them. The PCM file is always fully written before the
//! metadata is published, so a consumer that sees the metadata is guaranteed
//! to find the samples.

use crate::defaults;
use crate::error::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PCM sample encodings accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    Pcm16,
    /// 32-bit native-endian float in [-1, 1].
    F32,
}

impl SampleFormat {
    /// Bytes per sample for this encoding.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Pcm16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Metadata describing one published audio chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub session_id: String,
    /// Monotonic within a session; the first chunk is 0.
    pub chunk_id: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub is_last_chunk: bool,
    /// Name of the sibling PCM file in `audio/`.
    pub pcm_filename: String,
}

impl ChunkMetadata {
    /// Serialize to canonical JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    /// Expected PCM byte length implied by the declared duration.
    pub fn expected_byte_len(&self) -> usize {
        (self.duration_secs
            * self.sample_rate as f64
            * self.format.bytes_per_sample() as f64
            * self.channels as f64) as usize
    }

    /// True if `actual` is within the size tolerance of the declared length.
    pub fn matches_pcm_len(&self, actual: usize) -> bool {
        let expected = self.expected_byte_len() as f64;
        if expected == 0.0 {
            return false;
        }
        let deviation = (actual as f64 - expected).abs() / expected;
        deviation <= defaults::CHUNK_SIZE_TOLERANCE
    }

    /// Validate this record against the reader's wall clock `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CodecError> {
        super::validate_session_id(&self.session_id)?;

        if self.sample_rate != defaults::SAMPLE_RATE {
            return Err(CodecError::validation(format!(
                "sample_rate must be {}, got {}",
                defaults::SAMPLE_RATE,
                self.sample_rate
            )));
        }
        if self.channels != defaults::CHANNELS {
            return Err(CodecError::validation(format!(
                "channels must be {}, got {}",
                defaults::CHANNELS,
                self.channels
            )));
        }
        if !(self.duration_secs > 0.0 && self.duration_secs <= defaults::MAX_CHUNK_SECS) {
            return Err(CodecError::validation(format!(
                "duration_secs must be in (0, {}], got {}",
                defaults::MAX_CHUNK_SECS,
                self.duration_secs
            )));
        }
        let drift = (now - self.timestamp).num_seconds().abs();
        if drift > defaults::MAX_TIMESTAMP_DRIFT_SECS {
            return Err(CodecError::validation(format!(
                "timestamp drift {}s exceeds {}s",
                drift,
                defaults::MAX_TIMESTAMP_DRIFT_SECS
            )));
        }
        if self.pcm_filename.is_empty() {
            return Err(CodecError::validation("pcm_filename must not be empty"));
        }
        Ok(())
    }
}
