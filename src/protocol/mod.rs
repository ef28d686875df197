//! Wire records exchanged through the rendezvous.
//!
//! Every record is canonical JSON with ISO-8601 timestamps. Readers must call
//! `validate()` before acting on a decoded record; validation failures are
//! surfaced as [`CodecError::Validation`](crate::error::CodecError) and never
//! silently ignored.

pub mod chunk;
pub mod control;
pub mod settings;
pub mod status;
pub mod transcript;

pub use chunk::{ChunkMetadata, SampleFormat};
pub use control::{ControlSignal, Signal};
pub use settings::{PunctuationMode, Settings};
pub use status::{ErrorKind, ErrorRecord, StatusRecord};
pub use transcript::{FinalTranscript, PartialTranscript};

use crate::error::CodecError;

/// Validate a session id: opaque, 1 to 100 characters.
pub(crate) fn validate_session_id(session_id: &str) -> Result<(), CodecError> {
    if session_id.is_empty() {
        return Err(CodecError::validation("session_id must not be empty"));
    }
    if session_id.chars().count() > crate::defaults::MAX_SESSION_ID_LEN {
        return Err(CodecError::validation(format!(
            "session_id exceeds {} characters",
            crate::defaults::MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}
