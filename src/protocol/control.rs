//! Control signals published by the producer.

use crate::error::CodecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Begin a new session.
    Start,
    /// End the utterance; the final is driven by the `is_last_chunk` chunk.
    Stop,
    /// Abandon the session; no final may be emitted after this.
    Cancel,
    /// Request an immediate status record.
    Ping,
    /// Abandon the session and purge its rendezvous debris.
    Reset,
}

/// A control signal record, published under a single fixed name and
/// deleted by the consumer after it is acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSignal {
    pub signal: Signal,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ControlSignal {
    /// Build a signal for `session_id` stamped with the current time.
    pub fn now(signal: Signal, session_id: impl Into<String>) -> Self {
        Self {
            signal,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize to canonical JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    /// Validate the record before acting on it.
    pub fn validate(&self) -> Result<(), CodecError> {
        super::validate_session_id(&self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_signals_roundtrip() {
        for signal in [
            Signal::Start,
            Signal::Stop,
            Signal::Cancel,
            Signal::Ping,
            Signal::Reset,
        ] {
            let record = ControlSignal::now(signal, "S1");
            let json = record.to_json().expect("should serialize");
            let decoded = ControlSignal::from_json(&json).expect("should deserialize");
            assert_eq!(record, decoded, "roundtrip failed for {:?}", signal);
        }
    }

    #[test]
    fn test_signal_tag_is_snake_case() {
        let record = ControlSignal::now(Signal::Start, "S1");
        let json = record.to_json().unwrap();
        assert!(json.contains("\"signal\":\"start\""), "got: {}", json);
    }

    #[test]
    fn test_validate_session_id_bounds() {
        let record = ControlSignal::now(Signal::Cancel, "");
        assert!(record.validate().is_err());

        let record = ControlSignal::now(Signal::Cancel, "x".repeat(101));
        assert!(record.validate().is_err());

        let record = ControlSignal::now(Signal::Cancel, "S1");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_unknown_signal_rejected() {
        let json = r#"{"signal":"pause","session_id":"S1","timestamp":"2026-01-01T00:00:00Z"}"#;
        assert!(ControlSignal::from_json(json).is_err());
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let record = ControlSignal::now(Signal::Ping, "S1");
        let json = record.to_json().unwrap();
        // RFC 3339 / ISO-8601 with a T separator.
        assert!(json.contains("T"), "got: {}", json);
    }
}
