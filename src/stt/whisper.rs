//! Whisper-based inference engine.
//!
//! Wraps whisper.cpp via whisper-rs. Requires the `whisper` feature and
//! cmake at build time:
//!
//! ```bash
//! cargo build --features whisper
//! ```
//!
//! Without the feature a stub with the same shape is compiled so the
//! coordination core builds and tests everywhere.

use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use crate::stt::engine::{InferenceEngine, InferenceOutput, InferenceParams};
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use crate::stt::engine::Segment;

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper engine.
#[derive(Debug, Clone)]
pub struct WhisperEngineConfig {
    /// Path to the ggml model file.
    pub model_path: PathBuf,
    /// Language code, or "auto" for detection.
    pub language: String,
    /// Number of threads for inference (None = auto-detect).
    pub threads: Option<usize>,
    /// Whether to use GPU acceleration.
    pub use_gpu: bool,
}

impl Default for WhisperEngineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
            use_gpu: true,
        }
    }
}

/// Whisper inference engine.
///
/// Owned exclusively by the inference worker lane; the context is created
/// once at consumer startup and reused for every session.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: WhisperContext,
    config: WhisperEngineConfig,
    model_variant: String,
}

/// Whisper engine placeholder compiled without the `whisper` feature.
///
/// Construction succeeds if the model file exists so that configuration
/// paths can be exercised; `infer` always fails.
#[cfg(not(feature = "whisper"))]
pub struct WhisperEngine {
    config: WhisperEngineConfig,
    model_variant: String,
}

fn model_variant_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.strip_prefix("ggml-").unwrap_or(stem))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Load the model once. Fails with `ModelNotFound` if the file is
    /// missing, `Inference` if whisper.cpp rejects it.
    pub fn new(config: WhisperEngineConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(VoxbridgeError::ModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_variant = model_variant_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.flash_attn(true);
        context_params.use_gpu(config.use_gpu);
        let context = WhisperContext::new_with_params(
            config.model_path.to_str().ok_or_else(|| VoxbridgeError::Inference {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| VoxbridgeError::Inference {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        Ok(Self {
            context,
            config,
            model_variant,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &WhisperEngineConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl InferenceEngine for WhisperEngine {
    fn infer(&mut self, samples: &[f32], params: &InferenceParams) -> Result<InferenceOutput> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| VoxbridgeError::Inference {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut full_params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        let language = params
            .language
            .as_deref()
            .unwrap_or(self.config.language.as_str());
        if language == defaults::AUTO_LANGUAGE {
            full_params.set_language(None);
        } else {
            full_params.set_language(Some(language));
        }

        if let Some(threads) = self.config.threads {
            full_params.set_n_threads(threads as i32);
        }

        full_params.set_print_special(false);
        full_params.set_print_progress(false);
        full_params.set_print_realtime(false);
        full_params.set_print_timestamps(false);

        state
            .full(full_params, samples)
            .map_err(|e| VoxbridgeError::Inference {
                message: format!("Whisper inference failed: {}", e),
            })?;

        // Confidence from mean per-token probability. no_speech_prob only
        // measures "is there speech at all" and is useless for real speech.
        let mut segments = Vec::new();
        let mut prob_sum = 0.0_f64;
        let mut token_count = 0u32;

        for segment in state.as_iter() {
            let text = match segment.to_str_lossy() {
                Ok(text) => text.into_owned(),
                Err(_) => continue,
            };
            let mut tokens = Vec::new();
            for i in 0..segment.n_tokens() {
                if let Some(token) = segment.get_token(i) {
                    prob_sum += token.token_probability() as f64;
                    token_count += 1;

                    let token_text = match token.to_str_lossy() {
                        Ok(t) => t.into_owned(),
                        Err(_) => continue,
                    };
                    // Skip special tokens
                    if token_text.is_empty()
                        || token_text.starts_with("<|")
                        || token_text.starts_with("[_")
                    {
                        continue;
                    }
                    tokens.push(token_text);
                }
            }
            segments.push(Segment { text, tokens });
        }

        let confidence = if token_count > 0 {
            Some((prob_sum / token_count as f64).clamp(0.0, 1.0) as f32)
        } else {
            None
        };

        Ok(InferenceOutput {
            segments,
            confidence,
        })
    }

    fn model_variant(&self) -> &str {
        &self.model_variant
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    /// Create the stub engine. Checks the model path like the real engine.
    pub fn new(config: WhisperEngineConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(VoxbridgeError::ModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }
        let model_variant = model_variant_from_path(&config.model_path);
        Ok(Self {
            config,
            model_variant,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &WhisperEngineConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl InferenceEngine for WhisperEngine {
    fn infer(&mut self, _samples: &[f32], _params: &InferenceParams) -> Result<InferenceOutput> {
        Err(VoxbridgeError::Inference {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --features whisper (requires cmake)"
            )
            .to_string(),
        })
    }

    fn model_variant(&self) -> &str {
        &self.model_variant
    }

    fn is_ready(&self) -> bool {
        false
    }
}
