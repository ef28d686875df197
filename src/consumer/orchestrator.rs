//! Inference orchestration: one session at a time, one worker, one model.
//!
//! The orchestrator owns the engine for the lifetime of the process. It runs
//! on a dedicated worker thread and receives commands over a channel, so all
//! model operations are serialized by construction and no lock is ever held
//! across an inference call. Transcripts and errors leave through the
//! outbound writer channel; health state is exposed through a watch.

use crate::audio;
use crate::consumer::outbound::OutboundRecord;
use crate::consumer::sequencer::SessionChunk;
use crate::defaults;
use crate::protocol::{
    ErrorKind, ErrorRecord, FinalTranscript, PartialTranscript, Settings,
};
use crate::stt::{InferenceEngine, InferenceParams};
use crate::text::apply_punctuation;
use chrono::Utc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Commands accepted by the inference worker.
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Adopt a new session, implicitly cancelling any prior one.
    StartSession {
        session_id: String,
        settings: Settings,
    },
    /// An in-order chunk from the sequencer.
    Chunk(SessionChunk),
    /// Abandon the current session without emitting a final.
    Cancel,
    /// Drain and exit the worker thread.
    Shutdown,
}

/// Health snapshot published to the status lane.
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub model_loaded: bool,
    pub model_variant: String,
    pub processing: bool,
    pub current_session: Option<String>,
}

/// Owns the engine and turns in-order chunk streams into transcripts.
pub struct InferenceOrchestrator {
    engine: Box<dyn InferenceEngine>,
    outbound: mpsc::UnboundedSender<OutboundRecord>,
    state_tx: watch::Sender<OrchestratorState>,
    current: Option<String>,
    settings: Settings,
    /// Accumulated f32 samples for the current session.
    samples: Vec<f32>,
    /// Total time spent inside the engine for the current session.
    processing_ms: u64,
    buffer_capped: bool,
}

impl InferenceOrchestrator {
    /// Create the orchestrator and its state watch.
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        outbound: mpsc::UnboundedSender<OutboundRecord>,
    ) -> (Self, watch::Receiver<OrchestratorState>) {
        let initial = OrchestratorState {
            model_loaded: engine.is_ready(),
            model_variant: engine.model_variant().to_string(),
            processing: false,
            current_session: None,
        };
        let (state_tx, state_rx) = watch::channel(initial);
        (
            Self {
                engine,
                outbound,
                state_tx,
                current: None,
                settings: Settings::default(),
                samples: Vec::new(),
                processing_ms: 0,
                buffer_capped: false,
            },
            state_rx,
        )
    }

    /// Run one second of silence through the model so the first real chunk
    /// does not pay first-call allocation latency.
    pub fn warm_up(&mut self) {
        let silence = audio::silence(defaults::WARMUP_SECS, defaults::SAMPLE_RATE);
        let started = Instant::now();
        match self.engine.infer(&silence, &InferenceParams::default()) {
            Ok(_) => info!(elapsed_ms = started.elapsed().as_millis() as u64, "model warmed up"),
            Err(e) => warn!("model warm-up failed: {}", e),
        }
    }

    /// True while a session is being transcribed.
    pub fn processing(&self) -> bool {
        self.current.is_some()
    }

    /// Handle one command. Returns `false` when the worker should exit.
    pub fn handle(&mut self, command: OrchestratorCommand) -> bool {
        match command {
            OrchestratorCommand::StartSession {
                session_id,
                settings,
            } => self.start_session(session_id, settings),
            OrchestratorCommand::Chunk(chunk) => self.on_chunk(chunk),
            OrchestratorCommand::Cancel => self.cancel_session(),
            OrchestratorCommand::Shutdown => return false,
        }
        true
    }

    /// Adopt `session_id` as the single active session.
    pub fn start_session(&mut self, session_id: String, settings: Settings) {
        if let Some(prior) = self.current.take() {
            info!(prior = %prior, new = %session_id, "implicitly cancelling prior session");
        }
        info!(session = %session_id, "session started");
        self.current = Some(session_id);
        self.settings = settings;
        self.samples.clear();
        self.processing_ms = 0;
        self.buffer_capped = false;
        self.publish_state();
    }

    /// Abandon the current session. Idempotent; the model is not freed.
    pub fn cancel_session(&mut self) {
        if let Some(session) = self.current.take() {
            info!(session = %session, "session cancelled");
        }
        self.samples.clear();
        self.samples.shrink_to_fit();
        self.buffer_capped = false;
        self.publish_state();
    }

    /// Feed one in-order chunk through the model.
    pub fn on_chunk(&mut self, chunk: SessionChunk) {
        let Some(current) = self.current.clone() else {
            debug!(
                session = %chunk.metadata.session_id,
                chunk = chunk.metadata.chunk_id,
                "chunk ignored: no active session"
            );
            return;
        };
        if chunk.metadata.session_id != current {
            debug!(
                session = %chunk.metadata.session_id,
                chunk = chunk.metadata.chunk_id,
                "chunk ignored: session not current"
            );
            return;
        }

        let decoded = match audio::decode_samples(&chunk.pcm, chunk.metadata.format) {
            Ok(samples) => samples,
            Err(e) => {
                self.send_error(
                    ErrorKind::AudioProcessingFailed,
                    format!("chunk {} rejected: {}", chunk.metadata.chunk_id, e),
                    Some(current),
                );
                return;
            }
        };
        self.append_samples(decoded);

        let params = InferenceParams {
            language: self.settings.language.clone(),
        };
        let started = Instant::now();
        let output = match self.engine.infer(&self.samples, &params) {
            Ok(output) => output,
            Err(e) => {
                self.send_error(
                    ErrorKind::InferenceFailed,
                    format!("chunk {} inference failed: {}", chunk.metadata.chunk_id, e),
                    Some(current),
                );
                return;
            }
        };
        self.processing_ms += started.elapsed().as_millis() as u64;

        let text = apply_punctuation(&output.text(), self.settings.punctuation);

        if chunk.metadata.is_last_chunk {
            let record = FinalTranscript {
                session_id: current.clone(),
                text,
                is_final: true,
                processing_time_ms: self.processing_ms,
                confidence: output.confidence,
                timestamp: Utc::now(),
            };
            info!(
                session = %current,
                chars = record.text.len(),
                processing_ms = record.processing_time_ms,
                "session finalized"
            );
            let _ = self.outbound.send(OutboundRecord::Final(record));
            self.current = None;
            self.samples.clear();
            self.buffer_capped = false;
            self.publish_state();
        } else if self.settings.streaming_enabled {
            let record = PartialTranscript {
                session_id: current,
                text,
                tokens: output.tokens(),
                timestamp: Utc::now(),
            };
            let _ = self.outbound.send(OutboundRecord::Partial(record));
        }
    }

    /// Append decoded samples, capping the buffer at the session limit.
    fn append_samples(&mut self, decoded: Vec<f32>) {
        let cap = self.settings.max_session_secs as usize * defaults::SAMPLE_RATE as usize;
        let room = cap.saturating_sub(self.samples.len());
        if decoded.len() > room && !self.buffer_capped {
            warn!(
                max_session_secs = self.settings.max_session_secs,
                "session buffer full, discarding further audio"
            );
            self.buffer_capped = true;
        }
        self.samples.extend_from_slice(&decoded[..room.min(decoded.len())]);
    }

    fn send_error(&self, kind: ErrorKind, description: String, session_id: Option<String>) {
        warn!(?kind, "{}", description);
        let _ = self
            .outbound
            .send(OutboundRecord::Error(ErrorRecord::now(
                kind,
                description,
                session_id,
            )));
    }

    fn publish_state(&self) {
        let state = OrchestratorState {
            model_loaded: self.engine.is_ready(),
            model_variant: self.engine.model_variant().to_string(),
            processing: self.current.is_some(),
            current_session: self.current.clone(),
        };
        let _ = self.state_tx.send(state);
    }
}

/// Run the orchestrator on its dedicated worker thread.
///
/// The thread exits when the command channel closes or `Shutdown` arrives;
/// the engine is dropped (and the model freed) strictly after the worker
/// has drained.
pub fn spawn_worker(
    mut orchestrator: InferenceOrchestrator,
    mut commands: mpsc::UnboundedReceiver<OrchestratorCommand>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("inference-worker".to_string())
        .spawn(move || {
            orchestrator.warm_up();
            while let Some(command) = commands.blocking_recv() {
                if !orchestrator.handle(command) {
                    break;
                }
            }
            info!("inference worker drained, releasing model");
        })
        .expect("failed to spawn inference worker")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChunkMetadata, PunctuationMode, SampleFormat};
    use crate::stt::MockEngine;

    fn make_chunk(session_id: &str, chunk_id: u64, is_last: bool, samples: usize) -> SessionChunk {
        SessionChunk {
            metadata: ChunkMetadata {
                session_id: session_id.to_string(),
                chunk_id,
                sample_rate: 16000,
                channels: 1,
                format: SampleFormat::Pcm16,
                duration_secs: samples as f64 / 16000.0,
                timestamp: Utc::now(),
                is_last_chunk: is_last,
                pcm_filename: crate::rendezvous::chunk_pcm_name(session_id, chunk_id),
            },
            pcm: vec![0u8; samples * 2],
        }
    }

    fn setup(
        engine: MockEngine,
    ) -> (
        InferenceOrchestrator,
        mpsc::UnboundedReceiver<OutboundRecord>,
        watch::Receiver<OrchestratorState>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (orchestrator, state_rx) = InferenceOrchestrator::new(Box::new(engine), outbound_tx);
        (orchestrator, outbound_rx, state_rx)
    }

    #[test]
    fn test_single_chunk_session_emits_final() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m").with_response("hello world"));

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S1", 0, true, 12800));

        match outbound.try_recv().unwrap() {
            OutboundRecord::Final(record) => {
                assert_eq!(record.session_id, "S1");
                assert_eq!(record.text, "hello world");
                assert!(record.is_final);
            }
            other => panic!("expected final, got {:?}", other),
        }
        assert!(!orch.processing());
    }

    #[test]
    fn test_partials_then_final() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m").with_response("hi"));

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S1", 0, false, 3200));
        orch.on_chunk(make_chunk("S1", 1, false, 3200));
        orch.on_chunk(make_chunk("S1", 2, true, 3200));

        let mut partials = 0;
        let mut finals = 0;
        while let Ok(record) = outbound.try_recv() {
            match record {
                OutboundRecord::Partial(p) => {
                    assert_eq!(p.session_id, "S1");
                    partials += 1;
                }
                OutboundRecord::Final(_) => finals += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(partials, 2);
        assert_eq!(finals, 1);
    }

    #[test]
    fn test_streaming_disabled_suppresses_partials() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m"));
        let settings = Settings {
            streaming_enabled: false,
            ..Settings::default()
        };

        orch.start_session("S1".to_string(), settings);
        orch.on_chunk(make_chunk("S1", 0, false, 3200));
        orch.on_chunk(make_chunk("S1", 1, true, 3200));

        let first = outbound.try_recv().unwrap();
        assert!(matches!(first, OutboundRecord::Final(_)));
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_inference_runs_over_accumulated_buffer() {
        let engine = MockEngine::new("m");
        let log = engine.call_log();
        let (mut orch, _outbound, _state) = setup(engine);

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S1", 0, false, 1600));
        orch.on_chunk(make_chunk("S1", 1, false, 1600));
        orch.on_chunk(make_chunk("S1", 2, true, 1600));

        assert_eq!(*log.lock().unwrap(), vec![1600, 3200, 4800]);
    }

    #[test]
    fn test_chunk_for_other_session_ignored() {
        let engine = MockEngine::new("m");
        let log = engine.call_log();
        let (mut orch, mut outbound, _state) = setup(engine);

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S2", 0, true, 1600));

        assert!(log.lock().unwrap().is_empty());
        assert!(outbound.try_recv().is_err());
        assert!(orch.processing());
    }

    #[test]
    fn test_cancel_prevents_final() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m"));

        orch.start_session("S4".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S4", 0, false, 1600));
        orch.cancel_session();
        orch.on_chunk(make_chunk("S4", 1, true, 1600));

        while let Ok(record) = outbound.try_recv() {
            assert!(
                !matches!(record, OutboundRecord::Final(_)),
                "no final may follow a cancel"
            );
        }
        assert!(!orch.processing());
    }

    #[test]
    fn test_cancel_twice_is_noop() {
        let (mut orch, _outbound, state) = setup(MockEngine::new("m"));

        orch.start_session("S1".to_string(), Settings::default());
        orch.cancel_session();
        orch.cancel_session();

        assert!(!orch.processing());
        assert!(!state.borrow().processing);
    }

    #[test]
    fn test_start_supersedes_prior_session() {
        let engine = MockEngine::new("m");
        let log = engine.call_log();
        let (mut orch, mut outbound, state) = setup(engine);

        orch.start_session("S5".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S5", 0, false, 1600));
        orch.start_session("S6".to_string(), Settings::default());

        assert_eq!(state.borrow().current_session.as_deref(), Some("S6"));

        // S5 chunks are now stale and never reach the engine.
        let before = log.lock().unwrap().len();
        orch.on_chunk(make_chunk("S5", 1, true, 1600));
        assert_eq!(log.lock().unwrap().len(), before);

        // S6 buffer starts empty.
        orch.on_chunk(make_chunk("S6", 0, true, 800));
        assert_eq!(*log.lock().unwrap().last().unwrap(), 800usize);

        let mut finals = Vec::new();
        while let Ok(record) = outbound.try_recv() {
            if let OutboundRecord::Final(f) = record {
                finals.push(f.session_id);
            }
        }
        assert_eq!(finals, vec!["S6"]);
    }

    #[test]
    fn test_inference_failure_is_recoverable() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m").with_failure());

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S1", 0, false, 1600));

        match outbound.try_recv().unwrap() {
            OutboundRecord::Error(record) => {
                assert_eq!(record.kind, ErrorKind::InferenceFailed);
                assert!(record.recoverable);
                assert_eq!(record.session_id.as_deref(), Some("S1"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        // Session survives the per-chunk failure.
        assert!(orch.processing());
    }

    #[test]
    fn test_punctuation_mode_applied_to_final() {
        let (mut orch, mut outbound, _state) =
            setup(MockEngine::new("m").with_response("hello, world!"));
        let settings = Settings {
            punctuation: PunctuationMode::Sentence,
            ..Settings::default()
        };

        orch.start_session("S1".to_string(), settings);
        orch.on_chunk(make_chunk("S1", 0, true, 1600));

        match outbound.try_recv().unwrap() {
            OutboundRecord::Final(record) => assert_eq!(record.text, "Hello world"),
            other => panic!("expected final, got {:?}", other),
        }
    }

    #[test]
    fn test_session_buffer_is_capped() {
        let engine = MockEngine::new("m");
        let log = engine.call_log();
        let (mut orch, _outbound, _state) = setup(engine);
        let settings = Settings {
            max_session_secs: 1,
            ..Settings::default()
        };

        orch.start_session("S1".to_string(), settings);
        orch.on_chunk(make_chunk("S1", 0, false, 16000));
        orch.on_chunk(make_chunk("S1", 1, true, 16000));

        // Second chunk is discarded: the buffer stays at one second.
        assert_eq!(*log.lock().unwrap(), vec![16000, 16000]);
    }

    #[test]
    fn test_processing_time_accumulates() {
        let (mut orch, mut outbound, _state) = setup(MockEngine::new("m"));

        orch.start_session("S1".to_string(), Settings::default());
        orch.on_chunk(make_chunk("S1", 0, false, 1600));
        orch.on_chunk(make_chunk("S1", 1, true, 1600));

        let final_record = loop {
            match outbound.try_recv().unwrap() {
                OutboundRecord::Final(f) => break f,
                _ => continue,
            }
        };
        // The mock is effectively instant; the field is present and sane.
        assert!(final_record.processing_time_ms < 5000);
    }
}
