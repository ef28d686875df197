//! File name construction and parsing for rendezvous entries.
//!
//! Chunk pairs share a `chunk_<session>_<id>` stem so that the consumer can
//! locate the PCM sibling from the metadata name alone. Fixed names are
//! single-writer channels overwritten in place.

/// Fixed name of the final transcript file (overwritten per session).
pub const LATEST_TRANSCRIPTION: &str = "latest_transcription.json";

/// Fixed name of the control signal file.
pub const CONTROL_SIGNAL: &str = "control_signal.json";

/// Fixed name of the consumer status file.
pub const STATUS: &str = "status.json";

/// Fixed name of the error file.
pub const ERROR: &str = "error.json";

/// Fixed name of the settings file.
pub const SETTINGS: &str = "settings.json";

/// Prefix shared by both files of a chunk pair.
pub const CHUNK_PREFIX: &str = "chunk_";

/// Prefix of partial transcript files.
pub const PARTIAL_PREFIX: &str = "token_update_";

/// Name of the PCM half of a chunk pair.
pub fn chunk_pcm_name(session_id: &str, chunk_id: u64) -> String {
    format!("{CHUNK_PREFIX}{session_id}_{chunk_id}.pcm")
}

/// Name of the metadata half of a chunk pair.
pub fn chunk_metadata_name(session_id: &str, chunk_id: u64) -> String {
    format!("{CHUNK_PREFIX}{session_id}_{chunk_id}.json")
}

/// Name of a partial transcript file, keyed by epoch milliseconds.
pub fn partial_name(epoch_ms: i64) -> String {
    format!("{PARTIAL_PREFIX}{epoch_ms}.json")
}

/// True if `name` is the metadata half of a chunk pair.
pub fn is_chunk_metadata(name: &str) -> bool {
    name.starts_with(CHUNK_PREFIX) && name.ends_with(".json")
}

/// True if `name` is a partial transcript file.
pub fn is_partial(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX) && name.ends_with(".json")
}

/// True if `name` belongs to the given session (either half of a chunk pair
/// or any transcript record carrying the id in its name).
pub fn belongs_to_session(name: &str, session_id: &str) -> bool {
    name.contains(session_id)
}

/// Recover `(session_id, chunk_id)` from a chunk file name.
///
/// Session ids may themselves contain underscores, so the numeric id is
/// taken from the last `_`-separated segment.
pub fn parse_chunk_name(name: &str) -> Option<(String, u64)> {
    let stem = name
        .strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(".json")
        .or_else(|| name.strip_prefix(CHUNK_PREFIX)?.strip_suffix(".pcm"))?;
    let (session_id, id_str) = stem.rsplit_once('_')?;
    if session_id.is_empty() {
        return None;
    }
    let chunk_id = id_str.parse::<u64>().ok()?;
    Some((session_id.to_string(), chunk_id))
}
