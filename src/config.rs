//! Process-level configuration.
//!
//! This is ambient, per-process configuration (where the rendezvous lives,
//! which model file to load); everything the two processes must agree on at
//! runtime travels through the rendezvous as the settings record instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub rendezvous: RendezvousConfig,
    pub model: ModelConfig,
    pub consumer: ConsumerConfig,
    pub producer: ProducerConfig,
}

/// Shared rendezvous location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Root directory shared by both processes.
    pub root: PathBuf,
    /// Audit log location; defaults to `audit.log` under the root.
    pub audit_log: Option<PathBuf>,
}

/// Acoustic model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub language: String,
    pub threads: Option<usize>,
    pub use_gpu: bool,
}

/// Consumer-process tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Resident-memory ceiling in MB; unset disables the check.
    pub memory_limit_mb: Option<u64>,
}

/// Producer-process tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProducerConfig {
    /// Seconds to wait for a final transcript after end().
    pub timeout_secs: u64,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            root: default_rendezvous_root(),
            audit_log: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/ggml-base.bin"),
            language: crate::defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
            use_gpu: true,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: None,
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: crate::defaults::TRANSCRIPTION_TIMEOUT.as_secs(),
        }
    }
}

/// Shared default rendezvous root for both processes on this machine.
fn default_rendezvous_root() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voxbridge")
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                crate::error::VoxbridgeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                e.into()
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from a file, or fall back to defaults when it does not exist.
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(crate::error::VoxbridgeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("voxbridge")
            .join("config.toml")
    }

    /// Resolved audit log location.
    pub fn audit_log_path(&self) -> PathBuf {
        self.rendezvous
            .audit_log
            .clone()
            .unwrap_or_else(|| self.rendezvous.root.join("audit.log"))
    }
}
