//! Rendezvous polling on the consumer side.
//!
//! One lane polls `control/` and `audio/` every 50ms, enforces session
//! identity and chunk validity, and feeds the sequencer. Everything the
//! monitor forwards to the inference worker is already validated, sized,
//! and in session; everything else is deleted where it stands.

use crate::consumer::audit::AuditLog;
use crate::consumer::orchestrator::OrchestratorCommand;
use crate::consumer::outbound::OutboundRecord;
use crate::consumer::sequencer::{ChunkSequencer, SessionChunk};
use crate::consumer::status::MonitorStats;
use crate::defaults;
use crate::protocol::{
    ChunkMetadata, ControlSignal, ErrorKind, ErrorRecord, Settings, Signal,
};
use crate::rendezvous::{names, Channel, RendezvousStore};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Consumer-side rendezvous poller.
pub struct ConsumerMonitor {
    store: RendezvousStore,
    audit: AuditLog,
    sequencer: ChunkSequencer,
    current_session: Option<String>,
    orchestrator: mpsc::UnboundedSender<OrchestratorCommand>,
    outbound: mpsc::UnboundedSender<OutboundRecord>,
    ping: mpsc::UnboundedSender<()>,
    stats_tx: watch::Sender<MonitorStats>,
    /// Ingest is paused until this instant after a memory-pressure event.
    paused_until: Option<Instant>,
    last_pressure: Option<Instant>,
}

impl ConsumerMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: RendezvousStore,
        audit: AuditLog,
        orchestrator: mpsc::UnboundedSender<OrchestratorCommand>,
        outbound: mpsc::UnboundedSender<OutboundRecord>,
        ping: mpsc::UnboundedSender<()>,
    ) -> (Self, watch::Receiver<MonitorStats>) {
        let (stats_tx, stats_rx) = watch::channel(MonitorStats::default());
        (
            Self {
                store,
                audit,
                sequencer: ChunkSequencer::new(),
                current_session: None,
                orchestrator,
                outbound,
                ping,
                stats_tx,
                paused_until: None,
                last_pressure: None,
            },
            stats_rx,
        )
    }

    /// The session currently accepted for ingest.
    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    /// Out-of-order chunks currently buffered.
    pub fn buffered(&self) -> usize {
        self.sequencer.len()
    }

    /// One polling tick: control first, then the audio backlog.
    pub fn poll_once(&mut self, now: DateTime<Utc>) {
        if let Some(until) = self.paused_until {
            if Instant::now() < until {
                return;
            }
            self.paused_until = None;
            info!("ingest resumed after memory pressure backoff");
        }

        self.poll_control();
        self.poll_audio(now);
        self.publish_stats();
    }

    /// Read, act on, and delete the pending control signal, if any.
    fn poll_control(&mut self) {
        let bytes = match self.store.read(Channel::Control, names::CONTROL_SIGNAL) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!("control poll failed: {}", e);
                return;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        match ControlSignal::from_json(&text).and_then(|signal| {
            signal.validate()?;
            Ok(signal)
        }) {
            Ok(signal) => self.handle_signal(signal),
            Err(e) => warn!("discarding malformed control signal: {}", e),
        }
        if let Err(e) = self.store.delete(Channel::Control, names::CONTROL_SIGNAL) {
            warn!("cannot delete consumed control signal: {}", e);
        }
    }

    fn handle_signal(&mut self, signal: ControlSignal) {
        debug!(signal = ?signal.signal, session = %signal.session_id, "control signal");
        match signal.signal {
            Signal::Start => {
                self.purge_sequencer();
                self.current_session = Some(signal.session_id.clone());
                let settings = self.load_settings();
                self.audit
                    .record(&format!("session={} event=start", signal.session_id));
                let _ = self.orchestrator.send(OrchestratorCommand::StartSession {
                    session_id: signal.session_id,
                    settings,
                });
            }
            Signal::Stop => {
                // Final emission is driven by the chunk carrying is_last_chunk.
            }
            Signal::Cancel | Signal::Reset => {
                let _ = self.orchestrator.send(OrchestratorCommand::Cancel);
                self.purge_sequencer();
                self.session_scoped_cleanup(&signal.session_id);
                self.audit
                    .record(&format!("session={} event=cancel", signal.session_id));
                self.current_session = None;
            }
            Signal::Ping => {
                let _ = self.ping.send(());
            }
        }
    }

    /// Cross-process settings, falling back to defaults when the record is
    /// missing or malformed.
    fn load_settings(&self) -> Settings {
        match self.store.read(Channel::Settings, names::SETTINGS) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                match Settings::from_json(&text).and_then(|settings| {
                    settings.validate()?;
                    Ok(settings)
                }) {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("invalid settings record, using defaults: {}", e);
                        Settings::default()
                    }
                }
            }
            Err(e) if e.is_not_found() => Settings::default(),
            Err(e) => {
                warn!("cannot read settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Walk the audio backlog in modification-time order.
    fn poll_audio(&mut self, now: DateTime<Utc>) {
        let entries = match self.store.list(Channel::Audio) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("audio poll failed: {}", e);
                return;
            }
        };
        for entry in entries {
            if names::is_chunk_metadata(&entry.name) {
                self.process_chunk_file(&entry.name, now);
            }
        }
    }

    /// Validate one metadata file and route its chunk.
    fn process_chunk_file(&mut self, metadata_name: &str, now: DateTime<Utc>) {
        let bytes = match self.store.read(Channel::Audio, metadata_name) {
            Ok(bytes) => bytes,
            // Consumed concurrently or vanished; nothing to do.
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!("cannot read {}: {}", metadata_name, e);
                return;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let metadata = match ChunkMetadata::from_json(&text) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("undecodable chunk metadata {}: {}", metadata_name, e);
                self.delete_pair_by_name(metadata_name);
                return;
            }
        };

        if let Err(e) = metadata.validate(now) {
            warn!("invalid chunk {}: {}", metadata_name, e);
            self.surface_error(ErrorRecord::now(
                ErrorKind::InvalidAudioFormat,
                format!("chunk {} rejected: {}", metadata_name, e),
                Some(metadata.session_id.clone()),
            ));
            self.delete_pair(&metadata);
            return;
        }

        // Stale-session debris is deleted without reaching the sequencer.
        let is_current = self
            .current_session
            .as_deref()
            .is_some_and(|current| current == metadata.session_id);
        if !is_current {
            debug!(
                session = %metadata.session_id,
                chunk = metadata.chunk_id,
                "deleting chunk for non-current session"
            );
            self.delete_pair(&metadata);
            return;
        }

        // Duplicates of already-delivered ids are deleted here; the
        // sequencer handles duplicates of buffered ids.
        if metadata.chunk_id < self.sequencer.next_expected() {
            debug!(chunk = metadata.chunk_id, "deleting duplicate chunk");
            self.delete_pair(&metadata);
            return;
        }

        let pcm = match self.store.read(Channel::Audio, &metadata.pcm_filename) {
            Ok(pcm) => pcm,
            Err(e) if e.is_not_found() => {
                // Metadata without its sibling is unusable; drop the pair.
                warn!(
                    "chunk {} has no PCM sibling {}",
                    metadata_name, metadata.pcm_filename
                );
                self.delete_pair(&metadata);
                return;
            }
            Err(e) => {
                warn!("cannot read {}: {}", metadata.pcm_filename, e);
                return;
            }
        };

        if !metadata.matches_pcm_len(pcm.len()) {
            warn!(
                "chunk {} size {} does not match declared duration {}s",
                metadata_name,
                pcm.len(),
                metadata.duration_secs
            );
            self.surface_error(ErrorRecord::now(
                ErrorKind::InvalidAudioFormat,
                format!(
                    "chunk {} size {} off by more than {}% of declared",
                    metadata_name,
                    pcm.len(),
                    (defaults::CHUNK_SIZE_TOLERANCE * 100.0) as u32
                ),
                Some(metadata.session_id.clone()),
            ));
            self.delete_pair(&metadata);
            return;
        }

        let result = self.sequencer.accept(SessionChunk { metadata, pcm });
        for chunk in &result.evicted {
            self.audit.record(&format!(
                "session={} event=overflow_drop chunk={}",
                chunk.metadata.session_id, chunk.metadata.chunk_id
            ));
            self.delete_pair(&chunk.metadata);
        }
        if let Some(duplicate) = &result.duplicate {
            self.delete_pair(&duplicate.metadata);
        }
        for chunk in result.ready {
            self.delete_pair(&chunk.metadata);
            let _ = self.orchestrator.send(OrchestratorCommand::Chunk(chunk));
        }
    }

    /// Cancel the session and back off ingest; called by the runtime when
    /// resident memory crosses the configured limit.
    pub fn handle_memory_pressure(&mut self, memory_mb: u64, limit_mb: u64) {
        let now = Instant::now();
        let repeated = self
            .last_pressure
            .is_some_and(|prior| now.duration_since(prior) < std::time::Duration::from_secs(30));
        if repeated {
            warn!(
                memory_mb,
                limit_mb, "repeated memory pressure, consider a smaller model"
            );
        } else {
            warn!(memory_mb, limit_mb, "memory pressure, cancelling session");
        }
        self.last_pressure = Some(now);

        let session = self.current_session.clone();
        self.surface_error(ErrorRecord::now(
            ErrorKind::MemoryPressure,
            format!("resident memory {memory_mb} MB exceeds limit {limit_mb} MB"),
            session.clone(),
        ));
        let _ = self.orchestrator.send(OrchestratorCommand::Cancel);
        self.purge_sequencer();
        if let Some(session) = session {
            self.session_scoped_cleanup(&session);
            self.audit
                .record(&format!("session={session} event=memory_pressure"));
        }
        self.current_session = None;
        self.paused_until = Some(now + defaults::MEMORY_PRESSURE_BACKOFF);
    }

    /// Drop buffered chunks and their files.
    fn purge_sequencer(&mut self) {
        for chunk in self.sequencer.reset() {
            self.delete_pair(&chunk.metadata);
        }
    }

    /// Delete every audio and transcript file carrying the session id.
    fn session_scoped_cleanup(&self, session_id: &str) {
        for channel in [Channel::Audio, Channel::Transcripts] {
            let entries = match self.store.list(channel) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cleanup cannot list {:?}: {}", channel, e);
                    continue;
                }
            };
            for entry in entries {
                if names::belongs_to_session(&entry.name, session_id) {
                    if let Err(e) = self.store.delete(channel, &entry.name) {
                        warn!("cleanup cannot delete {}: {}", entry.name, e);
                    }
                }
            }
        }
    }

    fn delete_pair(&self, metadata: &ChunkMetadata) {
        let metadata_name =
            names::chunk_metadata_name(&metadata.session_id, metadata.chunk_id);
        if let Err(e) = self.store.delete(Channel::Audio, &metadata_name) {
            warn!("cannot delete {}: {}", metadata_name, e);
        }
        if let Err(e) = self.store.delete(Channel::Audio, &metadata.pcm_filename) {
            warn!("cannot delete {}: {}", metadata.pcm_filename, e);
        }
    }

    /// Delete a malformed pair when only the file name is trustworthy.
    fn delete_pair_by_name(&self, metadata_name: &str) {
        if let Err(e) = self.store.delete(Channel::Audio, metadata_name) {
            warn!("cannot delete {}: {}", metadata_name, e);
        }
        if let Some((session_id, chunk_id)) = names::parse_chunk_name(metadata_name) {
            let pcm_name = names::chunk_pcm_name(&session_id, chunk_id);
            if let Err(e) = self.store.delete(Channel::Audio, &pcm_name) {
                warn!("cannot delete {}: {}", pcm_name, e);
            }
        }
    }

    fn surface_error(&self, record: ErrorRecord) {
        let _ = self.outbound.send(OutboundRecord::Error(record));
    }

    fn publish_stats(&self) {
        let _ = self.stats_tx.send(MonitorStats {
            dropped_chunks: self.sequencer.dropped(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SampleFormat;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: RendezvousStore,
        monitor: ConsumerMonitor,
        commands: mpsc::UnboundedReceiver<OrchestratorCommand>,
        outbound: mpsc::UnboundedReceiver<OutboundRecord>,
        pings: mpsc::UnboundedReceiver<()>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = RendezvousStore::open(dir.path()).unwrap();
        let audit = AuditLog::new(dir.path().join("audit.log"));
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (ping_tx, pings) = mpsc::unbounded_channel();
        let (monitor, _stats) =
            ConsumerMonitor::new(store.clone(), audit, command_tx, outbound_tx, ping_tx);
        Fixture {
            _dir: dir,
            store,
            monitor,
            commands,
            outbound,
            pings,
        }
    }

    fn write_signal(store: &RendezvousStore, signal: Signal, session_id: &str) {
        let record = ControlSignal::now(signal, session_id);
        store
            .write_atomic(
                Channel::Control,
                names::CONTROL_SIGNAL,
                record.to_json().unwrap().as_bytes(),
            )
            .unwrap();
    }

    fn write_chunk(
        store: &RendezvousStore,
        session_id: &str,
        chunk_id: u64,
        is_last: bool,
        samples: usize,
    ) {
        let pcm_filename = names::chunk_pcm_name(session_id, chunk_id);
        let metadata = ChunkMetadata {
            session_id: session_id.to_string(),
            chunk_id,
            sample_rate: 16000,
            channels: 1,
            format: SampleFormat::Pcm16,
            duration_secs: samples as f64 / 16000.0,
            timestamp: Utc::now(),
            is_last_chunk: is_last,
            pcm_filename: pcm_filename.clone(),
        };
        store
            .write_atomic(Channel::Audio, &pcm_filename, &vec![0u8; samples * 2])
            .unwrap();
        store
            .write_atomic(
                Channel::Audio,
                &names::chunk_metadata_name(session_id, chunk_id),
                metadata.to_json().unwrap().as_bytes(),
            )
            .unwrap();
    }

    fn audio_file_count(store: &RendezvousStore) -> usize {
        store.list(Channel::Audio).unwrap().len()
    }

    #[test]
    fn test_start_signal_adopts_session() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");

        f.monitor.poll_once(Utc::now());

        assert_eq!(f.monitor.current_session(), Some("S1"));
        assert!(matches!(
            f.commands.try_recv().unwrap(),
            OrchestratorCommand::StartSession { ref session_id, .. } if session_id == "S1"
        ));
        // The signal file is consumed.
        assert!(!f
            .store
            .exists(Channel::Control, names::CONTROL_SIGNAL)
            .unwrap());
    }

    #[test]
    fn test_chunk_flows_to_orchestrator_and_files_are_consumed() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        write_chunk(&f.store, "S1", 0, true, 12800);
        f.monitor.poll_once(Utc::now());

        match f.commands.try_recv().unwrap() {
            OrchestratorCommand::Chunk(chunk) => {
                assert_eq!(chunk.metadata.chunk_id, 0);
                assert_eq!(chunk.pcm.len(), 25600);
            }
            other => panic!("expected chunk, got {:?}", other),
        }
        assert_eq!(audio_file_count(&f.store), 0);
    }

    #[test]
    fn test_out_of_order_reordered_before_orchestrator() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S2");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        // Arrival order 0, 2, 1, 3 across polls.
        for &(id, last) in &[(0u64, false), (2, false)] {
            write_chunk(&f.store, "S2", id, last, 1600);
            f.monitor.poll_once(Utc::now());
        }
        for &(id, last) in &[(1u64, false), (3, true)] {
            write_chunk(&f.store, "S2", id, last, 1600);
            f.monitor.poll_once(Utc::now());
        }

        let mut delivered = Vec::new();
        while let Ok(command) = f.commands.try_recv() {
            if let OrchestratorCommand::Chunk(chunk) = command {
                delivered.push(chunk.metadata.chunk_id);
            }
        }
        assert_eq!(delivered, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_stale_session_chunks_deleted_not_forwarded() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S6");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        // Debris from the aborted S5 session.
        write_chunk(&f.store, "S5", 0, false, 1600);
        write_chunk(&f.store, "S5", 1, false, 1600);
        f.monitor.poll_once(Utc::now());

        assert_eq!(audio_file_count(&f.store), 0);
        assert!(f.commands.try_recv().is_err());
    }

    #[test]
    fn test_chunks_without_session_are_deleted() {
        let mut f = fixture();
        write_chunk(&f.store, "S1", 0, false, 1600);
        f.monitor.poll_once(Utc::now());

        assert_eq!(audio_file_count(&f.store), 0);
        assert!(f.commands.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_chunk_deleted() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        write_chunk(&f.store, "S1", 0, false, 1600);
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        // The same chunk id republished is deleted without delivery.
        write_chunk(&f.store, "S1", 0, false, 1600);
        f.monitor.poll_once(Utc::now());

        assert_eq!(audio_file_count(&f.store), 0);
        assert!(f.commands.try_recv().is_err());
    }

    #[test]
    fn test_metadata_without_pcm_pair_deleted() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        let metadata = ChunkMetadata {
            session_id: "S1".to_string(),
            chunk_id: 0,
            sample_rate: 16000,
            channels: 1,
            format: SampleFormat::Pcm16,
            duration_secs: 0.1,
            timestamp: Utc::now(),
            is_last_chunk: false,
            pcm_filename: names::chunk_pcm_name("S1", 0),
        };
        f.store
            .write_atomic(
                Channel::Audio,
                &names::chunk_metadata_name("S1", 0),
                metadata.to_json().unwrap().as_bytes(),
            )
            .unwrap();

        f.monitor.poll_once(Utc::now());
        assert_eq!(audio_file_count(&f.store), 0);
        assert!(f.commands.try_recv().is_err());
    }

    #[test]
    fn test_size_mismatch_rejected_with_error() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        // Metadata declares 0.8s (25600 bytes) but the PCM file holds far less.
        let pcm_filename = names::chunk_pcm_name("S1", 0);
        let metadata = ChunkMetadata {
            session_id: "S1".to_string(),
            chunk_id: 0,
            sample_rate: 16000,
            channels: 1,
            format: SampleFormat::Pcm16,
            duration_secs: 0.8,
            timestamp: Utc::now(),
            is_last_chunk: true,
            pcm_filename: pcm_filename.clone(),
        };
        f.store
            .write_atomic(Channel::Audio, &pcm_filename, &[0u8; 1000])
            .unwrap();
        f.store
            .write_atomic(
                Channel::Audio,
                &names::chunk_metadata_name("S1", 0),
                metadata.to_json().unwrap().as_bytes(),
            )
            .unwrap();

        f.monitor.poll_once(Utc::now());

        assert_eq!(audio_file_count(&f.store), 0);
        assert!(f.commands.try_recv().is_err());
        match f.outbound.try_recv().unwrap() {
            OutboundRecord::Error(record) => {
                assert_eq!(record.kind, ErrorKind::InvalidAudioFormat)
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_metadata_rejected_with_error() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        let pcm_filename = names::chunk_pcm_name("S1", 0);
        let metadata = ChunkMetadata {
            session_id: "S1".to_string(),
            chunk_id: 0,
            sample_rate: 44100,
            channels: 1,
            format: SampleFormat::Pcm16,
            duration_secs: 0.1,
            timestamp: Utc::now(),
            is_last_chunk: false,
            pcm_filename: pcm_filename.clone(),
        };
        f.store
            .write_atomic(Channel::Audio, &pcm_filename, &[0u8; 3200])
            .unwrap();
        f.store
            .write_atomic(
                Channel::Audio,
                &names::chunk_metadata_name("S1", 0),
                metadata.to_json().unwrap().as_bytes(),
            )
            .unwrap();

        f.monitor.poll_once(Utc::now());

        assert_eq!(audio_file_count(&f.store), 0);
        assert!(matches!(
            f.outbound.try_recv().unwrap(),
            OutboundRecord::Error(record) if record.kind == ErrorKind::InvalidAudioFormat
        ));
    }

    #[test]
    fn test_undecodable_metadata_pair_deleted() {
        let mut f = fixture();
        f.store
            .write_atomic(Channel::Audio, "chunk_S1_0.pcm", &[0u8; 64])
            .unwrap();
        f.store
            .write_atomic(Channel::Audio, "chunk_S1_0.json", b"not json")
            .unwrap();

        f.monitor.poll_once(Utc::now());
        assert_eq!(audio_file_count(&f.store), 0);
    }

    #[test]
    fn test_cancel_purges_and_cleans_session_files() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S4");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        // One delivered chunk, one buffered out of order.
        write_chunk(&f.store, "S4", 0, false, 1600);
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();
        write_chunk(&f.store, "S4", 5, false, 1600);
        f.monitor.poll_once(Utc::now());
        assert_eq!(f.monitor.buffered(), 1);

        write_signal(&f.store, Signal::Cancel, "S4");
        f.monitor.poll_once(Utc::now());

        assert!(matches!(
            f.commands.try_recv().unwrap(),
            OrchestratorCommand::Cancel
        ));
        assert_eq!(f.monitor.current_session(), None);
        assert_eq!(f.monitor.buffered(), 0);
        assert_eq!(audio_file_count(&f.store), 0);
    }

    #[test]
    fn test_ping_triggers_status(){
        let mut f = fixture();
        write_signal(&f.store, Signal::Ping, "S1");
        f.monitor.poll_once(Utc::now());
        assert!(f.pings.try_recv().is_ok());
    }

    #[test]
    fn test_stop_is_ingest_noop() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        write_signal(&f.store, Signal::Stop, "S1");
        f.monitor.poll_once(Utc::now());

        assert_eq!(f.monitor.current_session(), Some("S1"));
        assert!(f.commands.try_recv().is_err());
    }

    #[test]
    fn test_memory_pressure_cancels_and_pauses() {
        let mut f = fixture();
        write_signal(&f.store, Signal::Start, "S1");
        f.monitor.poll_once(Utc::now());
        f.commands.try_recv().unwrap();

        f.monitor.handle_memory_pressure(900, 512);

        assert!(matches!(
            f.commands.try_recv().unwrap(),
            OrchestratorCommand::Cancel
        ));
        assert!(matches!(
            f.outbound.try_recv().unwrap(),
            OutboundRecord::Error(record) if record.kind == ErrorKind::MemoryPressure
        ));
        assert_eq!(f.monitor.current_session(), None);

        // Ingest is paused: a fresh start signal is not picked up yet.
        write_signal(&f.store, Signal::Start, "S2");
        f.monitor.poll_once(Utc::now());
        assert_eq!(f.monitor.current_session(), None);
    }

    #[test]
    fn test_overflow_reports_dropped_chunks_in_stats() {
        let dir = TempDir::new().unwrap();
        let store = RendezvousStore::open(dir.path()).unwrap();
        let audit = AuditLog::new(dir.path().join("audit.log"));
        let (command_tx, mut commands) = mpsc::unbounded_channel();
        let (outbound_tx, _outbound) = mpsc::unbounded_channel();
        let (ping_tx, _pings) = mpsc::unbounded_channel();
        let (mut monitor, stats) =
            ConsumerMonitor::new(store.clone(), audit, command_tx, outbound_tx, ping_tx);

        write_signal(&store, Signal::Start, "S3");
        monitor.poll_once(Utc::now());
        commands.try_recv().unwrap();

        write_chunk(&store, "S3", 0, false, 1600);
        monitor.poll_once(Utc::now());
        for id in 11..=21 {
            write_chunk(&store, "S3", id, false, 1600);
            monitor.poll_once(Utc::now());
        }

        assert_eq!(stats.borrow().dropped_chunks, 1);
        assert!(monitor.buffered() <= defaults::SEQUENCER_CAPACITY);
        // Chunk 0 was delivered; nothing else reached the orchestrator.
        let mut delivered = Vec::new();
        while let Ok(command) = commands.try_recv() {
            if let OrchestratorCommand::Chunk(chunk) = command {
                delivered.push(chunk.metadata.chunk_id);
            }
        }
        assert_eq!(delivered, vec![0]);
    }
}
