//! Consumer status and error records.

use crate::error::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire-level error taxonomy shared by both processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    ModelLoadFailed,
    AudioProcessingFailed,
    InferenceFailed,
    MemoryPressure,
    InvalidAudioFormat,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Whether a session can continue after this kind of error.
    ///
    /// Only memory pressure and model load failure end the session
    /// unconditionally; everything else is retryable per chunk.
    pub fn default_recoverable(self) -> bool {
        !matches!(self, ErrorKind::ModelLoadFailed | ErrorKind::MemoryPressure)
    }
}

/// An error surfaced across the rendezvous. Single fixed file,
/// delete-on-consume by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Build an error record stamped with the current time.
    pub fn now(kind: ErrorKind, description: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            session_id,
            recoverable: kind.default_recoverable(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(session_id) = &self.session_id {
            super::validate_session_id(session_id)?;
        }
        Ok(())
    }
}

/// Periodic consumer health record, overwritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub model_loaded: bool,
    pub processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_session: Option<String>,
    pub model_variant: String,
    pub memory_mb: u64,
    /// Cumulative count of chunks dropped by sequencer overflow.
    pub dropped_chunks: u64,
    pub last_update: DateTime<Utc>,
}

impl StatusRecord {
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(session_id) = &self.current_session {
            super::validate_session_id(session_id)?;
        }
        Ok(())
    }

    /// True if the record was written within `max_age` of `now`.
    /// A stale status marks the consumer as unavailable.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = now - self.last_update;
        age >= chrono::Duration::zero()
            && age <= chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero())
    }
}
