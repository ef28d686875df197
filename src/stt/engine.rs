//! The inference engine trait and the mock used in tests.

use crate::error::{Result, VoxbridgeError};
use std::sync::{Arc, Mutex};

/// Per-invocation inference parameters.
#[derive(Debug, Clone, Default)]
pub struct InferenceParams {
    /// 2-character language code, or `None` for auto-detection.
    pub language: Option<String>,
}

/// One decoded segment: its text plus the visible token strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub tokens: Vec<String>,
}

/// Output of one inference invocation over an accumulated sample buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    pub segments: Vec<Segment>,
    /// Mean token probability, when the backend reports one.
    pub confidence: Option<f32>,
}

impl InferenceOutput {
    /// Concatenated segment text, trimmed.
    pub fn text(&self) -> String {
        let mut combined = String::new();
        for segment in &self.segments {
            combined.push_str(&segment.text);
        }
        combined.trim().to_string()
    }

    /// All visible token strings in decode order.
    pub fn tokens(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| s.tokens.iter().cloned())
            .collect()
    }
}

/// Trait for streaming speech-to-text inference.
///
/// Implementations are owned by the single inference worker lane, so the
/// trait requires `Send` but not `Sync`, and `infer` takes `&mut self`.
pub trait InferenceEngine: Send {
    /// Run inference over the full accumulated sample buffer for a session.
    ///
    /// # Arguments
    /// * `samples` - f32 samples at 16kHz mono, normalized to [-1, 1]
    ///
    /// # Returns
    /// Decoded segments or error
    fn infer(&mut self, samples: &[f32], params: &InferenceParams) -> Result<InferenceOutput>;

    /// Name of the loaded model variant (e.g. "base.en").
    fn model_variant(&self) -> &str;

    /// Check if the engine is ready to serve sessions.
    fn is_ready(&self) -> bool;
}

/// Mock engine for testing.
///
/// Returns a canned response, optionally echoing the sample count so tests
/// can assert which audio actually reached the model, and records the
/// length of every invocation in a shared call log.
#[derive(Debug, Clone)]
pub struct MockEngine {
    model_variant: String,
    response: String,
    echo_sample_count: bool,
    should_fail: bool,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MockEngine {
    /// Create a new mock engine with default settings.
    pub fn new(model_variant: &str) -> Self {
        Self {
            model_variant: model_variant.to_string(),
            response: "mock transcription".to_string(),
            echo_sample_count: false,
            should_fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a specific response.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to append the sample count to each response.
    pub fn with_sample_count_echo(mut self) -> Self {
        self.echo_sample_count = true;
        self
    }

    /// Configure the mock to fail on infer.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Shared handle to the per-call sample counts.
    pub fn call_log(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.calls)
    }
}

impl InferenceEngine for MockEngine {
    fn infer(&mut self, samples: &[f32], _params: &InferenceParams) -> Result<InferenceOutput> {
        self.calls.lock().expect("call log poisoned").push(samples.len());

        if self.should_fail {
            return Err(VoxbridgeError::Inference {
                message: "mock inference failure".to_string(),
            });
        }

        let text = if self.echo_sample_count {
            format!("{} [{} samples]", self.response, samples.len())
        } else {
            self.response.clone()
        };
        let tokens = text.split_whitespace().map(|w| w.to_string()).collect();
        Ok(InferenceOutput {
            segments: vec![Segment { text, tokens }],
            confidence: Some(0.9),
        })
    }

    fn model_variant(&self) -> &str {
        &self.model_variant
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
