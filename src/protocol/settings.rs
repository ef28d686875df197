//! Cross-process settings written by the producer, read by the consumer.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// Punctuation post-processing applied to partial and final transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PunctuationMode {
    /// Pass model output through untouched.
    #[default]
    Auto,
    /// Strip punctuation characters, including model-inserted ones.
    None,
    /// Strip punctuation, then capitalize sentence-initially.
    Sentence,
}

/// Settings record published as `settings/settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub punctuation: PunctuationMode,
    /// 2-character language code, or `None` for auto-detection.
    pub language: Option<String>,
    pub vad_enabled: bool,
    pub vad_threshold: f32,
    pub streaming_enabled: bool,
    pub chunk_size_ms: u32,
    pub max_session_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            punctuation: PunctuationMode::Auto,
            language: None,
            vad_enabled: false,
            vad_threshold: 0.02,
            streaming_enabled: true,
            chunk_size_ms: 200,
            max_session_secs: 60,
        }
    }
}

impl Settings {
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encoding)
    }

    pub fn from_json(s: &str) -> Result<Self, CodecError> {
        serde_json::from_str(s).map_err(CodecError::Decoding)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(language) = &self.language
            && language.chars().count() != 2
        {
            return Err(CodecError::validation(format!(
                "language must be a 2-character code, got {language:?}"
            )));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(CodecError::validation(format!(
                "vad_threshold must be in [0, 1], got {}",
                self.vad_threshold
            )));
        }
        if !(50..=1000).contains(&self.chunk_size_ms) {
            return Err(CodecError::validation(format!(
                "chunk_size_ms must be in [50, 1000], got {}",
                self.chunk_size_ms
            )));
        }
        if !(1..=300).contains(&self.max_session_secs) {
            return Err(CodecError::validation(format!(
                "max_session_secs must be in [1, 300], got {}",
                self.max_session_secs
            )));
        }
        Ok(())
    }
}
