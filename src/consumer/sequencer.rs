//! Bounded reorder buffer between the rendezvous poller and the inference
//! worker.
//!
//! Chunks may be observed out of publication order; the sequencer holds
//! out-of-order arrivals until the contiguous prefix advances and delivers
//! strictly ascending `chunk_id`s starting at 0. The buffer is bounded:
//! on overflow the smallest buffered id is evicted, never one already
//! delivered. Overflow is counted and surfaced via status; it does not
//! abort the session.

use crate::defaults;
use crate::protocol::ChunkMetadata;
use std::collections::BTreeMap;
use tracing::warn;

/// A validated chunk: its metadata plus the raw PCM bytes read from the
/// sibling file. Carries everything needed to delete the pair later.
#[derive(Debug, Clone)]
pub struct SessionChunk {
    pub metadata: ChunkMetadata,
    pub pcm: Vec<u8>,
}

impl SessionChunk {
    /// Name of the metadata file this chunk was read from.
    pub fn metadata_name(&self) -> String {
        crate::rendezvous::chunk_metadata_name(&self.metadata.session_id, self.metadata.chunk_id)
    }

    /// Name of the PCM file this chunk was read from.
    pub fn pcm_name(&self) -> String {
        crate::rendezvous::chunk_pcm_name(&self.metadata.session_id, self.metadata.chunk_id)
    }
}

/// What became of one accepted chunk.
#[derive(Debug, Default)]
pub struct SequencerResult {
    /// Chunks now deliverable in contiguous ascending order.
    pub ready: Vec<SessionChunk>,
    /// Chunks evicted by overflow; the caller deletes their files.
    pub evicted: Vec<SessionChunk>,
    /// The incoming chunk when it was a duplicate; the caller deletes its files.
    pub duplicate: Option<SessionChunk>,
}

/// Bounded reorder buffer keyed by `chunk_id`.
pub struct ChunkSequencer {
    buffer: BTreeMap<u64, SessionChunk>,
    /// The next chunk id owed to the orchestrator (first chunk is 0).
    next_expected: u64,
    capacity: usize,
    dropped: u64,
}

impl ChunkSequencer {
    /// Creates a sequencer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(defaults::SEQUENCER_CAPACITY)
    }

    /// Creates a sequencer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BTreeMap::new(),
            next_expected: 0,
            capacity,
            dropped: 0,
        }
    }

    /// Number of chunks currently buffered out of order.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The next chunk id the orchestrator will receive.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Cumulative count of chunks dropped by overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Accept one validated chunk and classify it.
    pub fn accept(&mut self, chunk: SessionChunk) -> SequencerResult {
        let mut result = SequencerResult::default();
        let chunk_id = chunk.metadata.chunk_id;

        if chunk_id < self.next_expected {
            result.duplicate = Some(chunk);
            return result;
        }

        if chunk_id == self.next_expected {
            self.next_expected += 1;
            result.ready.push(chunk);
            // Drain any buffered run that is now contiguous.
            while let Some(buffered) = self.buffer.remove(&self.next_expected) {
                self.next_expected += 1;
                result.ready.push(buffered);
            }
            return result;
        }

        // Out of order: buffer, evicting the oldest on overflow. A repeat of
        // an already-buffered id replaces it and the stale copy is dropped.
        if let Some(stale) = self.buffer.insert(chunk_id, chunk) {
            result.duplicate = Some(stale);
            return result;
        }
        if self.buffer.len() > self.capacity {
            if let Some((evicted_id, evicted)) = self.buffer.pop_first() {
                warn!(
                    chunk_id = evicted_id,
                    buffered = self.buffer.len(),
                    "sequencer overflow, dropping oldest buffered chunk"
                );
                self.dropped += 1;
                result.evicted.push(evicted);
            }
        }
        result
    }

    /// Clear all buffered chunks, returning them so the caller can delete
    /// their files. `next_expected` restarts at 0 for the next session.
    pub fn reset(&mut self) -> Vec<SessionChunk> {
        self.next_expected = 0;
        let drained: Vec<SessionChunk> = std::mem::take(&mut self.buffer).into_values().collect();
        drained
    }
}

impl Default for ChunkSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SampleFormat;
    use chrono::Utc;

    fn make_chunk(session_id: &str, chunk_id: u64) -> SessionChunk {
        SessionChunk {
            metadata: ChunkMetadata {
                session_id: session_id.to_string(),
                chunk_id,
                sample_rate: 16000,
                channels: 1,
                format: SampleFormat::Pcm16,
                duration_secs: 0.2,
                timestamp: Utc::now(),
                is_last_chunk: false,
                pcm_filename: crate::rendezvous::chunk_pcm_name(session_id, chunk_id),
            },
            pcm: vec![0u8; 64],
        }
    }

    fn ready_ids(result: &SequencerResult) -> Vec<u64> {
        result.ready.iter().map(|c| c.metadata.chunk_id).collect()
    }

    #[test]
    fn test_in_order_delivery() {
        let mut seq = ChunkSequencer::new();
        for id in 0..4 {
            let result = seq.accept(make_chunk("S1", id));
            assert_eq!(ready_ids(&result), vec![id]);
        }
        assert_eq!(seq.next_expected(), 4);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_out_of_order_buffers_until_contiguous() {
        let mut seq = ChunkSequencer::new();

        // mtime order 0, 2, 1, 3 must come out 0, 1, 2, 3.
        let result = seq.accept(make_chunk("S2", 0));
        assert_eq!(ready_ids(&result), vec![0]);

        let result = seq.accept(make_chunk("S2", 2));
        assert!(result.ready.is_empty());
        assert_eq!(seq.len(), 1);

        let result = seq.accept(make_chunk("S2", 1));
        assert_eq!(ready_ids(&result), vec![1, 2]);
        assert!(seq.is_empty());

        let result = seq.accept(make_chunk("S2", 3));
        assert_eq!(ready_ids(&result), vec![3]);
    }

    #[test]
    fn test_duplicate_already_delivered() {
        let mut seq = ChunkSequencer::new();
        seq.accept(make_chunk("S1", 0));
        seq.accept(make_chunk("S1", 1));

        let result = seq.accept(make_chunk("S1", 0));
        assert!(result.ready.is_empty());
        assert!(result.duplicate.is_some());
        assert_eq!(seq.next_expected(), 2);
    }

    #[test]
    fn test_duplicate_of_buffered_chunk() {
        let mut seq = ChunkSequencer::new();
        seq.accept(make_chunk("S1", 0));
        seq.accept(make_chunk("S1", 5));

        let result = seq.accept(make_chunk("S1", 5));
        assert!(result.duplicate.is_some());
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest_buffered() {
        let mut seq = ChunkSequencer::new();

        // Chunk 0 is delivered; 11..=20 fill the buffer.
        let result = seq.accept(make_chunk("S3", 0));
        assert_eq!(ready_ids(&result), vec![0]);
        for id in 11..=20 {
            let result = seq.accept(make_chunk("S3", id));
            assert!(result.ready.is_empty());
            assert!(result.evicted.is_empty());
        }
        assert_eq!(seq.len(), 10);

        // The 11th out-of-order chunk evicts the smallest buffered id.
        let result = seq.accept(make_chunk("S3", 21));
        assert_eq!(result.evicted.len(), 1);
        assert_eq!(result.evicted[0].metadata.chunk_id, 11);
        assert_eq!(seq.len(), 10);
        assert_eq!(seq.next_expected(), 1);
        assert_eq!(seq.dropped(), 1);
    }

    #[test]
    fn test_overflow_never_drops_delivered() {
        let mut seq = ChunkSequencer::with_capacity(2);
        seq.accept(make_chunk("S1", 0));
        seq.accept(make_chunk("S1", 5));
        seq.accept(make_chunk("S1", 6));

        let result = seq.accept(make_chunk("S1", 7));
        // Eviction takes buffered id 5, not the delivered id 0.
        assert_eq!(result.evicted[0].metadata.chunk_id, 5);
        assert_eq!(seq.next_expected(), 1);
    }

    #[test]
    fn test_buffer_size_never_exceeds_capacity() {
        let mut seq = ChunkSequencer::new();
        for id in 10..40 {
            seq.accept(make_chunk("S1", id));
            assert!(seq.len() <= defaults::SEQUENCER_CAPACITY);
        }
    }

    #[test]
    fn test_reset_returns_buffered_and_restarts() {
        let mut seq = ChunkSequencer::new();
        seq.accept(make_chunk("S1", 0));
        seq.accept(make_chunk("S1", 3));
        seq.accept(make_chunk("S1", 4));

        let drained = seq.reset();
        assert_eq!(drained.len(), 2);
        assert_eq!(seq.next_expected(), 0);
        assert!(seq.is_empty());

        // A new session starts over at 0.
        let result = seq.accept(make_chunk("S2", 0));
        assert_eq!(ready_ids(&result), vec![0]);
    }

    #[test]
    fn test_gap_fill_drains_longest_run() {
        let mut seq = ChunkSequencer::new();
        seq.accept(make_chunk("S1", 1));
        seq.accept(make_chunk("S1", 2));
        seq.accept(make_chunk("S1", 4));

        let result = seq.accept(make_chunk("S1", 0));
        assert_eq!(ready_ids(&result), vec![0, 1, 2]);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.next_expected(), 3);
    }
}
