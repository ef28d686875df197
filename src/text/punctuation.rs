//! Punctuation post-processing for partial and final transcripts.
//!
//! The model is free to emit punctuation of its own; the selected mode is
//! applied after inference, so "none" also strips model-inserted marks.

use crate::protocol::PunctuationMode;

/// Apply the configured punctuation mode to transcript text.
pub fn apply_punctuation(text: &str, mode: PunctuationMode) -> String {
    match mode {
        PunctuationMode::Auto => text.to_string(),
        PunctuationMode::None => strip_punctuation(text),
        PunctuationMode::Sentence => capitalize_initial(&strip_punctuation(text)),
    }
}

/// Remove punctuation characters, collapsing any runs of whitespace the
/// removal leaves behind.
fn strip_punctuation(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !is_unicode_punctuation(*c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_unicode_punctuation(c: char) -> bool {
    // The common marks Whisper emits beyond ASCII.
    matches!(c, '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2026}' | '\u{2014}')
}

/// Uppercase the first alphabetic character of the text.
fn capitalize_initial(text: &str) -> String {
    let mut done = false;
    text.chars()
        .map(|c| {
            if !done && c.is_alphabetic() {
                done = true;
                c.to_uppercase().next().unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}
