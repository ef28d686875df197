//! Producer-side session lifecycle.
//!
//! The session is driven from the capture lane and owns everything the
//! producer publishes: the `start`/`stop`/`cancel` signals, numbered chunk
//! pairs, and the settings record. Inbound records are handled by the
//! [monitor](crate::producer::monitor); its events are fed back through
//! [`ProducerSession::on_event`] to advance the state machine.

use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use crate::producer::monitor::{MonitorCommand, ProducerEvent};
use crate::protocol::{
    ChunkMetadata, ControlSignal, SampleFormat, Settings, Signal, StatusRecord,
};
use crate::rendezvous::{names, Channel, RendezvousStore};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Producer session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    AwaitingFinal,
    Failed,
}

/// A chunk accepted but not yet published. Publication is delayed by one
/// chunk so that `end()` can mark the in-flight chunk as the last one.
#[derive(Debug)]
struct PendingChunk {
    pcm: Vec<u8>,
    format: SampleFormat,
    duration_secs: f64,
}

/// Per-utterance producer state machine.
///
/// `Idle → Recording → AwaitingFinal → Idle`, with `Failed` on error or
/// timeout and back to `Idle` on acknowledgement.
pub struct ProducerSession {
    store: RendezvousStore,
    commands: mpsc::UnboundedSender<MonitorCommand>,
    state: SessionState,
    session_id: Option<String>,
    chunk_counter: u64,
    pending: Option<PendingChunk>,
    timeout: Duration,
    /// Drop counter observed in consumer status when the session began.
    drops_at_begin: u64,
}

impl ProducerSession {
    pub fn new(
        store: RendezvousStore,
        commands: mpsc::UnboundedSender<MonitorCommand>,
    ) -> Self {
        Self {
            store,
            commands,
            state: SessionState::Idle,
            session_id: None,
            chunk_counter: 0,
            pending: None,
            timeout: defaults::TRANSCRIPTION_TIMEOUT,
            drops_at_begin: 0,
        }
    }

    /// Override the final-transcript timeout (default 10s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Chunks published so far in this session.
    pub fn published_chunks(&self) -> u64 {
        self.chunk_counter
    }

    /// Mint a session id, publish `start`, and begin accepting chunks.
    pub fn begin(&mut self) -> Result<String> {
        if self.state == SessionState::Recording || self.state == SessionState::AwaitingFinal {
            return Err(VoxbridgeError::SessionState {
                message: format!("cannot begin in state {:?}", self.state),
            });
        }

        let session_id = Uuid::new_v4().to_string();
        self.publish_signal(Signal::Start, &session_id)?;
        self.session_id = Some(session_id.clone());
        self.chunk_counter = 0;
        self.pending = None;
        self.drops_at_begin = self
            .read_status()
            .map(|status| status.dropped_chunks)
            .unwrap_or(0);
        self.state = SessionState::Recording;
        let _ = self
            .commands
            .send(MonitorCommand::SessionStarted(session_id.clone()));
        info!(session = %session_id, "session begun");
        Ok(session_id)
    }

    /// Accept one captured chunk.
    ///
    /// The previous pending chunk (if any) is published first; this one is
    /// held back until the next submit or `end()`, unless `is_last` is set.
    pub fn submit_chunk(
        &mut self,
        pcm: Vec<u8>,
        format: SampleFormat,
        duration_secs: f64,
        is_last: bool,
    ) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(VoxbridgeError::SessionState {
                message: format!("cannot submit chunk in state {:?}", self.state),
            });
        }

        if let Some(pending) = self.pending.take() {
            self.publish_chunk(pending, false)?;
        }

        let chunk = PendingChunk {
            pcm,
            format,
            duration_secs,
        };
        if is_last {
            self.publish_chunk(chunk, true)?;
        } else {
            self.pending = Some(chunk);
        }
        Ok(())
    }

    /// Publish `stop`, flush the in-flight chunk as last, and start waiting
    /// for the final transcript.
    pub fn end(&mut self) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(VoxbridgeError::SessionState {
                message: format!("cannot end in state {:?}", self.state),
            });
        }
        let session_id = self.current_id()?;

        if let Some(pending) = self.pending.take() {
            self.publish_chunk(pending, true)?;
        }
        self.publish_signal(Signal::Stop, &session_id)?;
        self.state = SessionState::AwaitingFinal;
        let _ = self.commands.send(MonitorCommand::AwaitFinal {
            session_id,
            deadline: Instant::now() + self.timeout,
        });
        Ok(())
    }

    /// Publish `cancel` and return straight to idle. Idempotent.
    pub fn abort(&mut self) -> Result<()> {
        let Some(session_id) = self.session_id.clone() else {
            return Ok(());
        };
        if self.state == SessionState::Idle || self.state == SessionState::Failed {
            return Ok(());
        }

        self.publish_signal(Signal::Cancel, &session_id)?;
        self.pending = None;
        self.state = SessionState::Idle;
        self.session_id = None;
        let _ = self.commands.send(MonitorCommand::Aborted(session_id));
        Ok(())
    }

    /// Advance the state machine on a monitor event for this session.
    pub fn on_event(&mut self, event: &ProducerEvent) {
        match event {
            ProducerEvent::Final { session_id, .. } => {
                if self.session_id.as_deref() == Some(session_id.as_str()) {
                    self.state = SessionState::Idle;
                    self.session_id = None;
                }
            }
            ProducerEvent::TimedOut { session_id } => {
                if self.session_id.as_deref() == Some(session_id.as_str()) {
                    self.state = SessionState::Failed;
                }
            }
            ProducerEvent::Error { session_id, .. } => {
                let ours = match session_id {
                    Some(id) => self.session_id.as_deref() == Some(id.as_str()),
                    // Session-less errors (model load) fail any session.
                    None => self.session_id.is_some(),
                };
                if ours && self.state != SessionState::Idle {
                    self.state = SessionState::Failed;
                }
            }
            ProducerEvent::Partial { .. } => {}
        }
    }

    /// Acknowledge a surfaced failure and return to idle.
    pub fn acknowledge_failure(&mut self) {
        if self.state == SessionState::Failed {
            self.state = SessionState::Idle;
            self.session_id = None;
            self.pending = None;
        }
    }

    /// Publish the cross-process settings record.
    pub fn publish_settings(&self, settings: &Settings) -> Result<()> {
        settings
            .validate()
            .map_err(crate::error::VoxbridgeError::Codec)?;
        self.store.write_atomic(
            Channel::Settings,
            names::SETTINGS,
            settings.to_json()?.as_bytes(),
        )?;
        Ok(())
    }

    /// True when the consumer has published a fresh status record recently.
    pub fn consumer_available(&self) -> bool {
        self.read_status()
            .map(|status| status.is_fresh(Utc::now(), defaults::STATUS_STALE_AFTER))
            .unwrap_or(false)
    }

    /// Throttle hint, checked before each publication. True when fresh
    /// status shows the consumer dropping chunks since this session began,
    /// or still working another session after several chunks went out.
    /// The producer never blocks on this; the bounded sequencer is the
    /// hard pressure release.
    pub fn should_throttle(&self) -> bool {
        let Some(status) = self.read_status() else {
            return false;
        };
        if !status.is_fresh(Utc::now(), defaults::STATUS_STALE_AFTER) {
            return false;
        }
        let dropping = status.processing && status.dropped_chunks > self.drops_at_begin;
        let unadopted = status.current_session.as_deref() != self.session_id.as_deref()
            && self.chunk_counter > defaults::BACKPRESSURE_CHUNKS;
        dropping || unadopted
    }

    fn read_status(&self) -> Option<StatusRecord> {
        let bytes = self.store.read(Channel::Control, names::STATUS).ok()?;
        let text = String::from_utf8_lossy(&bytes);
        match StatusRecord::from_json(&text).and_then(|status| {
            status.validate()?;
            Ok(status)
        }) {
            Ok(status) => Some(status),
            Err(e) => {
                debug!("unreadable status record: {}", e);
                None
            }
        }
    }

    fn current_id(&self) -> Result<String> {
        self.session_id
            .clone()
            .ok_or_else(|| VoxbridgeError::SessionState {
                message: "no active session".to_string(),
            })
    }

    /// Publish the PCM file first, then the metadata: a consumer that sees
    /// the metadata must be able to find the samples.
    fn publish_chunk(&mut self, chunk: PendingChunk, is_last: bool) -> Result<()> {
        let session_id = self.current_id()?;
        let chunk_id = self.chunk_counter;
        let pcm_filename = names::chunk_pcm_name(&session_id, chunk_id);
        let metadata = ChunkMetadata {
            session_id,
            chunk_id,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            format: chunk.format,
            duration_secs: chunk.duration_secs,
            timestamp: Utc::now(),
            is_last_chunk: is_last,
            pcm_filename: pcm_filename.clone(),
        };

        self.store
            .write_atomic(Channel::Audio, &pcm_filename, &chunk.pcm)?;
        let metadata_name = names::chunk_metadata_name(&metadata.session_id, chunk_id);
        self.store.write_atomic(
            Channel::Audio,
            &metadata_name,
            metadata.to_json()?.as_bytes(),
        )?;

        self.chunk_counter += 1;
        debug!(chunk = chunk_id, is_last, "chunk published");
        Ok(())
    }

    fn publish_signal(&self, signal: Signal, session_id: &str) -> Result<()> {
        let record = ControlSignal::now(signal, session_id);
        if let Err(e) = record.validate() {
            warn!("refusing to publish invalid control signal: {}", e);
            return Err(e.into());
        }
        self.store.write_atomic(
            Channel::Control,
            names::CONTROL_SIGNAL,
            record.to_json()?.as_bytes(),
        )?;
        Ok(())
    }
}
