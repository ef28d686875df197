//! Partial and final transcript records published by the consumer.

use crate::error::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A non-authoritative in-flight transcript. Fire-and-forget: loss is
/// acceptable, and the producer deletes each one on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialTranscript {
    pub session_id: String,
    /// Cumulative text for the session so far. The model may revise earlier
    /// words, so consecutive partials are not strictly prefix-monotonic.
    pub text: String,
    pub tokens: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl PartialTranscript {
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        super::validate_session_id(&self.session_id)
    }
}

/// The authoritative transcript at session end. Published exactly once per
/// successful session to a single overwritten file; readers suppress
/// re-delivery by modification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalTranscript {
    pub session_id: String,
    pub text: String,
    pub is_final: bool,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl FinalTranscript {
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        super::validate_session_id(&self.session_id)?;
        if !self.is_final {
            return Err(CodecError::validation("final transcript must set is_final"));
        }
        if let Some(confidence) = self.confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            return Err(CodecError::validation(format!(
                "confidence must be in [0, 1], got {confidence}"
            )));
        }
        Ok(())
    }
}
