//! The consumer process: model host side of the rendezvous.
//!
//! Lane layout:
//! ```text
//! ┌────────────┐   chunks    ┌───────────────┐  transcripts  ┌──────────┐
//! │  Monitor   │────────────▶│  Inference    │──────────────▶│ Outbound │──▶ rendezvous
//! │ (50ms poll)│  commands   │  worker thread│    errors     │  writer  │
//! └────────────┘             └───────────────┘               └──────────┘
//!       │ stats watch               │ state watch
//!       ▼                           ▼
//!   ┌─────────────────────────────────┐        ┌────────┐
//!   │        Status publisher (1s)    │        │ Reaper │
//!   └─────────────────────────────────┘        └────────┘
//! ```
//! Each channel has a single reader; the model is only ever entered from
//! the worker thread.

pub mod audit;
pub mod monitor;
pub mod orchestrator;
pub mod outbound;
pub mod reaper;
pub mod sequencer;
pub mod status;

pub use audit::AuditLog;
pub use monitor::ConsumerMonitor;
pub use orchestrator::{
    spawn_worker, InferenceOrchestrator, OrchestratorCommand, OrchestratorState,
};
pub use outbound::OutboundRecord;
pub use sequencer::{ChunkSequencer, SequencerResult, SessionChunk};
pub use status::MonitorStats;

use crate::defaults;
use crate::error::Result;
use crate::protocol::{ErrorKind, ErrorRecord};
use crate::rendezvous::RendezvousStore;
use crate::stt::InferenceEngine;
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Consumer runtime options beyond the store itself.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Resident-memory ceiling; crossing it cancels the session.
    pub memory_limit_mb: Option<u64>,
    /// Location of the rotated audit log.
    pub audit_log_path: PathBuf,
}

/// Handle to a running consumer runtime.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<OrchestratorCommand>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    worker: std::thread::JoinHandle<()>,
}

impl ConsumerHandle {
    /// Stop all lanes and release the model.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.commands.send(OrchestratorCommand::Shutdown);
        // The worker must drain before the model handle is dropped.
        let worker = self.worker;
        let _ = tokio::task::spawn_blocking(move || worker.join()).await;
        for task in self.tasks {
            let _ = task.await;
        }
        info!("consumer stopped");
    }
}

/// Start every consumer lane. The engine is moved onto the dedicated
/// worker thread and warmed with one second of silence.
pub fn start(
    store: RendezvousStore,
    engine: Box<dyn InferenceEngine>,
    options: ConsumerOptions,
) -> Result<ConsumerHandle> {
    let audit = AuditLog::new(options.audit_log_path);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (ping_tx, ping_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (orchestrator, state_rx) = InferenceOrchestrator::new(engine, outbound_tx.clone());
    let worker = spawn_worker(orchestrator, command_rx);

    let (monitor, stats_rx) = ConsumerMonitor::new(
        store.clone(),
        audit.clone(),
        command_tx.clone(),
        outbound_tx,
        ping_tx,
    );

    let tasks = vec![
        tokio::spawn(outbound::run_writer(store.clone(), outbound_rx)),
        tokio::spawn(status::run_publisher(
            store.clone(),
            state_rx,
            stats_rx,
            ping_rx,
        )),
        tokio::spawn(reaper::run_reaper(
            store.clone(),
            audit,
            shutdown_rx.clone(),
        )),
        tokio::spawn(run_monitor(
            monitor,
            options.memory_limit_mb,
            shutdown_rx,
        )),
    ];

    info!(root = %store.root().display(), "consumer started");
    Ok(ConsumerHandle {
        shutdown: shutdown_tx,
        commands: command_tx,
        tasks,
        worker,
    })
}

/// Drive the monitor at the consumer polling cadence, checking resident
/// memory about once a second when a limit is configured.
pub async fn run_monitor(
    mut monitor: ConsumerMonitor,
    memory_limit_mb: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut system = sysinfo::System::new();
    let pid = sysinfo::get_current_pid().ok();
    let mut last_memory_check = Instant::now();

    let mut ticker = tokio::time::interval(defaults::CONSUMER_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let (Some(limit), Some(pid)) = (memory_limit_mb, pid)
                    && last_memory_check.elapsed() >= Duration::from_secs(1)
                {
                    last_memory_check = Instant::now();
                    let memory_mb = status::resident_memory_mb(&mut system, pid);
                    if memory_mb > limit {
                        monitor.handle_memory_pressure(memory_mb, limit);
                        continue;
                    }
                }
                monitor.poll_once(Utc::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Publish the non-recoverable model-load failure and leave the error for
/// the producer; the consumer refuses sessions until restart.
pub fn publish_model_load_failure(store: &RendezvousStore, error: &crate::error::VoxbridgeError) {
    let record = ErrorRecord::now(
        ErrorKind::ModelLoadFailed,
        format!("model load failed: {error}"),
        None,
    );
    if let Err(e) = outbound::write_record(store, &OutboundRecord::Error(record)) {
        warn!("cannot publish model-load failure: {}", e);
    }
}
