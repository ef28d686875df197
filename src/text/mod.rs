//! Transcript text post-processing.

pub mod punctuation;

pub use punctuation::apply_punctuation;
