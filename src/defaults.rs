//! Default constants shared across the producer and consumer processes.
//!
//! Both sides must agree on these values, so they live in one place
//! instead of being duplicated per configuration type.

use std::time::Duration;

/// Audio sample rate in Hz required by the acoustic model.
///
/// 16kHz mono is the only format the Whisper family accepts; every chunk
/// is validated against this before it reaches the inference worker.
pub const SAMPLE_RATE: u32 = 16_000;

/// Channel count required for every chunk.
pub const CHANNELS: u16 = 1;

/// Maximum allowed chunk duration in seconds.
pub const MAX_CHUNK_SECS: f64 = 10.0;

/// Tolerance for the declared-vs-actual PCM byte length check.
///
/// A chunk whose file size differs from `duration * rate * bytes_per_sample`
/// by more than this fraction is rejected as malformed.
pub const CHUNK_SIZE_TOLERANCE: f64 = 0.10;

/// Maximum clock drift accepted between a chunk's producer timestamp and the
/// consumer's wall clock, in seconds.
pub const MAX_TIMESTAMP_DRIFT_SECS: i64 = 300;

/// Maximum session id length in characters (UUIDs are 36).
pub const MAX_SESSION_ID_LEN: usize = 100;

/// Reorder buffer capacity of the chunk sequencer.
pub const SEQUENCER_CAPACITY: usize = 10;

/// Consumer-side rendezvous polling interval.
pub const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Producer-side rendezvous polling interval.
pub const PRODUCER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the producer waits for a final transcript after `end()`.
pub const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between periodic status records.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// A status record older than this marks the consumer as unavailable.
pub const STATUS_STALE_AFTER: Duration = Duration::from_secs(5);

/// Interval between periodic reaper sweeps.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Startup sweep: anything in the rendezvous older than this is deleted.
pub const STARTUP_SWEEP_MAX_AGE: Duration = Duration::from_secs(3600);

/// Periodic sweep: audio chunks older than this are orphans.
pub const AUDIO_MAX_AGE: Duration = Duration::from_secs(60);

/// Periodic sweep: partial transcript files older than this are orphans.
pub const PARTIAL_MAX_AGE: Duration = Duration::from_secs(300);

/// A `.tmp` sibling older than this is residue of a write that crashed
/// between the temp write and the rename. Real publishes take milliseconds.
pub const TEMP_FILE_MAX_AGE: Duration = Duration::from_secs(60);

/// Audit log rotation threshold in bytes.
pub const AUDIT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Rotated audit archives older than this are deleted.
pub const AUDIT_ARCHIVE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Unacknowledged-chunk threshold before the producer throttles submission.
pub const BACKPRESSURE_CHUNKS: u64 = 5;

/// How long the consumer pauses ingest after a memory-pressure event.
pub const MEMORY_PRESSURE_BACKOFF: Duration = Duration::from_secs(2);

/// Duration of the silence buffer used to warm the model at startup, seconds.
pub const WARMUP_SECS: usize = 1;

/// Default language setting: let the model detect the spoken language.
pub const AUTO_LANGUAGE: &str = "auto";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_bounds_are_ordered() {
        assert!(AUDIO_MAX_AGE < PARTIAL_MAX_AGE);
        assert!(PARTIAL_MAX_AGE < STARTUP_SWEEP_MAX_AGE);
    }

    #[test]
    fn poll_intervals_are_bounded() {
        assert!(CONSUMER_POLL_INTERVAL <= Duration::from_millis(50));
        assert!(PRODUCER_POLL_INTERVAL <= Duration::from_millis(100));
    }
}
