//! Single writer lane for consumer-published rendezvous records.
//!
//! Transcripts and errors from the inference worker funnel through one
//! channel with one reader, so no two tasks ever write the same rendezvous
//! name concurrently.

use crate::protocol::{ErrorRecord, FinalTranscript, PartialTranscript};
use crate::rendezvous::{names, Channel, RendezvousStore};
use tokio::sync::mpsc;
use tracing::warn;

/// A record on its way to the rendezvous.
#[derive(Debug)]
pub enum OutboundRecord {
    Partial(PartialTranscript),
    Final(FinalTranscript),
    Error(ErrorRecord),
}

/// Write one record to its rendezvous location.
pub fn write_record(store: &RendezvousStore, record: &OutboundRecord) -> crate::error::Result<()> {
    match record {
        OutboundRecord::Partial(partial) => {
            let name = names::partial_name(partial.timestamp.timestamp_millis());
            store.write_atomic(Channel::Transcripts, &name, partial.to_json()?.as_bytes())?;
        }
        OutboundRecord::Final(final_record) => {
            store.write_atomic(
                Channel::Transcripts,
                names::LATEST_TRANSCRIPTION,
                final_record.to_json()?.as_bytes(),
            )?;
        }
        OutboundRecord::Error(error) => {
            store.write_atomic(Channel::Control, names::ERROR, error.to_json()?.as_bytes())?;
        }
    }
    Ok(())
}

/// Drain the outbound channel until every sender is dropped.
///
/// Write failures are logged and the lane continues; a partial lost here is
/// acceptable by contract, and a lost final will surface as a producer-side
/// timeout rather than a hang.
pub async fn run_writer(
    store: RendezvousStore,
    mut records: mpsc::UnboundedReceiver<OutboundRecord>,
) {
    while let Some(record) = records.recv().await {
        if let Err(e) = write_record(&store, &record) {
            warn!("outbound write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorKind, FinalTranscript, PartialTranscript};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RendezvousStore) {
        let dir = TempDir::new().unwrap();
        let store = RendezvousStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_partial_written_under_timestamp_name() {
        let (_dir, store) = open_store();
        let partial = PartialTranscript {
            session_id: "S1".to_string(),
            text: "hel".to_string(),
            tokens: vec![],
            timestamp: Utc::now(),
        };
        let expected_name = names::partial_name(partial.timestamp.timestamp_millis());

        write_record(&store, &OutboundRecord::Partial(partial)).unwrap();
        assert!(store.exists(Channel::Transcripts, &expected_name).unwrap());
    }

    #[test]
    fn test_final_overwrites_fixed_name() {
        let (_dir, store) = open_store();
        for text in ["one", "two"] {
            let record = FinalTranscript {
                session_id: "S1".to_string(),
                text: text.to_string(),
                is_final: true,
                processing_time_ms: 1,
                confidence: None,
                timestamp: Utc::now(),
            };
            write_record(&store, &OutboundRecord::Final(record)).unwrap();
        }

        let bytes = store
            .read(Channel::Transcripts, names::LATEST_TRANSCRIPTION)
            .unwrap();
        let decoded = FinalTranscript::from_json(std::str::from_utf8(&bytes).unwrap()).unwrap();
        assert_eq!(decoded.text, "two");
    }

    #[test]
    fn test_error_written_to_control() {
        let (_dir, store) = open_store();
        let record = ErrorRecord::now(ErrorKind::InferenceFailed, "boom", Some("S1".to_string()));
        write_record(&store, &OutboundRecord::Error(record)).unwrap();
        assert!(store.exists(Channel::Control, names::ERROR).unwrap());
    }

    #[tokio::test]
    async fn test_writer_drains_channel() {
        let (_dir, store) = open_store();
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(run_writer(store.clone(), rx));

        tx.send(OutboundRecord::Error(ErrorRecord::now(
            ErrorKind::Unknown,
            "x",
            None,
        )))
        .unwrap();
        drop(tx);
        writer.await.unwrap();

        assert!(store.exists(Channel::Control, names::ERROR).unwrap());
    }
}
