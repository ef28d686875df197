//! Producer-side rendezvous polling.
//!
//! One lane polls `transcripts/` and the error file every 100ms and turns
//! them into [`ProducerEvent`]s with a single reader (the UI lane). The
//! monitor also owns the session timeout and the text-insertion surface:
//! exactly one of {inserted text, error, timeout} is surfaced per session.

use crate::error::CodecError;
use crate::protocol::{ErrorKind, ErrorRecord, FinalTranscript, PartialTranscript};
use crate::rendezvous::{names, Channel, RendezvousStore};
use crate::sink::TextSink;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Session lifecycle notifications from the capture lane.
#[derive(Debug)]
pub enum MonitorCommand {
    /// A session began; its records are now current.
    SessionStarted(String),
    /// `end()` was called; the final is due before `deadline`.
    AwaitFinal {
        session_id: String,
        deadline: Instant,
    },
    /// The session was aborted; suppress everything still inbound for it.
    Aborted(String),
}

/// Events surfaced to the UI lane.
#[derive(Debug, Clone)]
pub enum ProducerEvent {
    /// A partial transcript for the current session.
    Partial {
        session_id: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// The final transcript; the text has already gone to the sink.
    Final { session_id: String, text: String },
    /// A consumer-side error record.
    Error {
        session_id: Option<String>,
        kind: ErrorKind,
        description: String,
        recoverable: bool,
    },
    /// No final arrived within the timeout.
    TimedOut { session_id: String },
}

/// Polls inbound rendezvous records for the producer.
pub struct ProducerMonitor {
    store: RendezvousStore,
    commands: mpsc::UnboundedReceiver<MonitorCommand>,
    events: mpsc::UnboundedSender<ProducerEvent>,
    sink: Arc<dyn TextSink>,
    current: Option<String>,
    deadline: Option<Instant>,
    /// Modification time of the final file when last delivered or seen.
    last_final_mtime: Option<SystemTime>,
    /// Timestamp of the displayed final; older partials are stale.
    displayed_final_ts: Option<DateTime<Utc>>,
}

impl ProducerMonitor {
    pub fn new(
        store: RendezvousStore,
        commands: mpsc::UnboundedReceiver<MonitorCommand>,
        events: mpsc::UnboundedSender<ProducerEvent>,
        sink: Arc<dyn TextSink>,
    ) -> Self {
        Self {
            store,
            commands,
            events,
            sink,
            current: None,
            deadline: None,
            last_final_mtime: None,
            displayed_final_ts: None,
        }
    }

    /// The session whose records are currently accepted.
    pub fn current_session(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// One polling tick.
    pub fn poll_once(&mut self, now: Instant) {
        self.drain_commands();
        self.check_timeout(now);
        self.poll_partials();
        self.poll_final();
        self.poll_error();
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MonitorCommand::SessionStarted(session_id) => {
                    self.current = Some(session_id);
                    self.deadline = None;
                }
                MonitorCommand::AwaitFinal {
                    session_id,
                    deadline,
                } => {
                    if self.current.as_deref() == Some(session_id.as_str()) {
                        self.deadline = Some(deadline);
                    }
                }
                MonitorCommand::Aborted(session_id) => {
                    if self.current.as_deref() == Some(session_id.as_str()) {
                        self.current = None;
                        self.deadline = None;
                    }
                }
            }
        }
    }

    /// Surface a timeout when the final did not arrive in time. Partials
    /// arriving after this point are for a non-current session and ignored.
    fn check_timeout(&mut self, now: Instant) {
        let Some(deadline) = self.deadline else { return };
        if now < deadline {
            return;
        }
        let Some(session_id) = self.current.take() else {
            self.deadline = None;
            return;
        };
        self.deadline = None;
        warn!(session = %session_id, "timed out waiting for final transcript");
        let _ = self.events.send(ProducerEvent::TimedOut { session_id });
    }

    /// Partials are delete-on-consume; stale ones are suppressed after
    /// deletion so a delayed partial can never overwrite a displayed final.
    fn poll_partials(&mut self) {
        let entries = match self.store.list(Channel::Transcripts) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("transcript poll failed: {}", e);
                return;
            }
        };
        for entry in entries {
            if !names::is_partial(&entry.name) {
                continue;
            }
            let bytes = match self.store.read(Channel::Transcripts, &entry.name) {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!("cannot read partial {}: {}", entry.name, e);
                    continue;
                }
            };
            if let Err(e) = self.store.delete(Channel::Transcripts, &entry.name) {
                warn!("cannot delete consumed partial {}: {}", entry.name, e);
            }

            let text = String::from_utf8_lossy(&bytes);
            let partial = match PartialTranscript::from_json(&text).and_then(|partial| {
                partial.validate()?;
                Ok(partial)
            }) {
                Ok(partial) => partial,
                Err(e) => {
                    warn!("discarding malformed partial {}: {}", entry.name, e);
                    continue;
                }
            };

            if self.current.as_deref() != Some(partial.session_id.as_str()) {
                debug!(session = %partial.session_id, "suppressing partial for non-current session");
                continue;
            }
            if let Some(final_ts) = self.displayed_final_ts
                && partial.timestamp <= final_ts
            {
                debug!("suppressing partial older than displayed final");
                continue;
            }
            let _ = self.events.send(ProducerEvent::Partial {
                session_id: partial.session_id,
                text: partial.text,
                timestamp: partial.timestamp,
            });
        }
    }

    /// The final file is overwritten in place; delivery is keyed on its
    /// modification time so re-reads never duplicate.
    fn poll_final(&mut self) {
        let mtime = match self.store.mtime(Channel::Transcripts, names::LATEST_TRANSCRIPTION) {
            Ok(Some(mtime)) => mtime,
            Ok(None) => return,
            Err(e) => {
                warn!("final poll failed: {}", e);
                return;
            }
        };
        if self.last_final_mtime == Some(mtime) {
            return;
        }
        self.last_final_mtime = Some(mtime);

        let bytes = match self
            .store
            .read(Channel::Transcripts, names::LATEST_TRANSCRIPTION)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot read final transcript: {}", e);
                return;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let final_record = match FinalTranscript::from_json(&text).and_then(|record| {
            record.validate()?;
            Ok(record)
        }) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding malformed final transcript: {}", e);
                return;
            }
        };

        if self.current.as_deref() != Some(final_record.session_id.as_str()) {
            debug!(
                session = %final_record.session_id,
                "suppressing final for non-current session"
            );
            return;
        }

        info!(
            session = %final_record.session_id,
            chars = final_record.text.len(),
            processing_ms = final_record.processing_time_ms,
            "final transcript received"
        );
        if let Err(e) = self.sink.insert(&final_record.text) {
            warn!("text insertion failed: {}", e);
            let _ = self.events.send(ProducerEvent::Error {
                session_id: Some(final_record.session_id.clone()),
                kind: ErrorKind::Unknown,
                description: format!("text insertion failed: {e}"),
                recoverable: true,
            });
        }
        self.displayed_final_ts = Some(final_record.timestamp);
        self.current = None;
        self.deadline = None;
        let _ = self.events.send(ProducerEvent::Final {
            session_id: final_record.session_id,
            text: final_record.text,
        });
    }

    /// The error file is delete-on-consume.
    fn poll_error(&mut self) {
        let bytes = match self.store.read(Channel::Control, names::ERROR) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                warn!("error poll failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.delete(Channel::Control, names::ERROR) {
            warn!("cannot delete consumed error record: {}", e);
        }

        let text = String::from_utf8_lossy(&bytes);
        let record = match ErrorRecord::from_json(&text).and_then(|record| {
            record.validate()?;
            Ok::<_, CodecError>(record)
        }) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding malformed error record: {}", e);
                return;
            }
        };

        // Errors tagged for another session are stale debris.
        if let Some(session_id) = &record.session_id
            && self.current.as_deref() != Some(session_id.as_str())
        {
            debug!(session = %session_id, "suppressing error for non-current session");
            return;
        }

        warn!(kind = ?record.kind, "consumer error: {}", record.description);
        if !record.recoverable {
            self.current = None;
            self.deadline = None;
        }
        let _ = self.events.send(ProducerEvent::Error {
            session_id: record.session_id,
            kind: record.kind,
            description: record.description,
            recoverable: record.recoverable,
        });
    }
}

/// Drive the monitor at the producer polling cadence.
pub async fn run_monitor(
    mut monitor: ProducerMonitor,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(crate::defaults::PRODUCER_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => monitor.poll_once(Instant::now()),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
