//! Speech-to-text inference engines.
//!
//! The orchestrator only ever talks to the [`InferenceEngine`] trait; the
//! real implementation wraps whisper.cpp behind the `whisper` feature, and a
//! mock backs every test.

pub mod engine;
pub mod whisper;

pub use engine::{InferenceEngine, InferenceOutput, InferenceParams, MockEngine, Segment};
pub use whisper::{WhisperEngine, WhisperEngineConfig};
