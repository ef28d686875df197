//! PCM handling for chunk payloads.
//!
//! Microphone capture and resampling live outside this crate; everything
//! here operates on raw 16kHz mono PCM bytes as they appear in the
//! rendezvous `audio/` channel.

pub mod format;

pub use format::{decode_samples, pcm16_to_f32, silence};
