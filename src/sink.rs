//! Pluggable text output for finalized transcripts.
//!
//! The real insertion surface (keyboard extension, portal, clipboard) lives
//! outside this crate; the producer only needs something that accepts a
//! UTF-8 string and reports success or failure.

use crate::error::{Result, VoxbridgeError};
use std::sync::{Arc, Mutex};

/// Destination for finalized transcript text.
pub trait TextSink: Send + Sync {
    /// Insert transcribed text at the current cursor position.
    fn insert(&self, text: &str) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Sink that accumulates inserted text, for tests and the demo driver.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<String>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything inserted so far.
    pub fn collected(&self) -> Vec<String> {
        self.collected.lock().expect("collector poisoned").clone()
    }
}

impl TextSink for CollectorSink {
    fn insert(&self, text: &str) -> Result<()> {
        self.collected
            .lock()
            .expect("collector poisoned")
            .push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Sink that always fails, for exercising error paths in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl TextSink for FailingSink {
    fn insert(&self, _text: &str) -> Result<()> {
        Err(VoxbridgeError::InsertionFailed {
            message: "failing sink".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_accumulates() {
        let sink = CollectorSink::new();
        sink.insert("hello").unwrap();
        sink.insert("world").unwrap();
        assert_eq!(sink.collected(), vec!["hello", "world"]);
    }

    #[test]
    fn test_collector_clones_share_storage() {
        let sink = CollectorSink::new();
        let clone = sink.clone();
        clone.insert("shared").unwrap();
        assert_eq!(sink.collected(), vec!["shared"]);
    }

    #[test]
    fn test_failing_sink_errors() {
        let sink = FailingSink;
        assert!(sink.insert("anything").is_err());
    }

    #[test]
    fn test_sink_is_object_safe() {
        let sink: Box<dyn TextSink> = Box::new(CollectorSink::new());
        sink.insert("boxed").unwrap();
        assert_eq!(sink.name(), "collector");
    }
}
