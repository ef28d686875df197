//! Error types for voxbridge.

use thiserror::Error;

/// Errors raised by the rendezvous store.
#[derive(Error, Debug)]
pub enum RendezvousError {
    #[error("Rendezvous container not found at {path}")]
    ContainerNotFound { path: String },

    #[error("Invalid rendezvous entry name: {name}")]
    InvalidName { name: String },

    #[error("Rendezvous entry not found: {name}")]
    NotFound { name: String },

    #[error("Rendezvous I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RendezvousError {
    /// True when the entry simply does not exist (a normal polling outcome).
    pub fn is_not_found(&self) -> bool {
        matches!(self, RendezvousError::NotFound { .. })
    }
}

/// Errors raised by the message codec.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode record: {0}")]
    Encoding(serde_json::Error),

    #[error("Failed to decode record: {0}")]
    Decoding(serde_json::Error),

    #[error("Record failed validation: {reason}")]
    Validation { reason: String },
}

impl CodecError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        CodecError::Validation {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum VoxbridgeError {
    // Rendezvous and codec layers
    #[error("Rendezvous error: {0}")]
    Rendezvous(#[from] RendezvousError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Inference errors
    #[error("Acoustic model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    // Audio errors
    #[error("Invalid audio: {reason}")]
    InvalidAudio { reason: String },

    // Session lifecycle errors
    #[error("Session state error: {message}")]
    SessionState { message: String },

    // Text insertion errors
    #[error("Text insertion failed: {message}")]
    InsertionFailed { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxbridgeError>;
