//! Append-only audit log of consumer lifecycle events.
//!
//! One timestamped line per event: session start/finish/cancel, reap counts,
//! overflow drops. Rotation is size-bounded and owned by the Reaper.

use crate::error::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Handle to the audit log file. Cheap to clone; every append opens the
/// file, so rotation can swap the file out underneath at any point.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line. Failures are logged and swallowed: the audit
    /// trail must never take down the pipeline.
    pub fn record(&self, event: &str) {
        if let Err(e) = self.append(event) {
            warn!("audit append failed: {}", e);
        }
    }

    fn append(&self, event: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {}", Utc::now().to_rfc3339(), event)?;
        Ok(())
    }

    /// Current size in bytes, or 0 when the file does not exist yet.
    pub fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
