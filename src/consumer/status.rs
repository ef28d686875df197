//! Periodic consumer health publication.
//!
//! Writes `control/status.json` every second and immediately on `ping`.
//! Producers treat a record older than a few seconds as consumer-down.

use crate::consumer::orchestrator::OrchestratorState;
use crate::defaults;
use crate::protocol::StatusRecord;
use crate::rendezvous::{names, Channel, RendezvousStore};
use chrono::Utc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Counters fed from the monitor lane.
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    /// Cumulative sequencer-overflow drops.
    pub dropped_chunks: u64,
}

/// Resident set size of this process in megabytes.
pub(crate) fn resident_memory_mb(system: &mut System, pid: Pid) -> u64 {
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system
        .process(pid)
        .map(|p| p.memory() / (1024 * 1024))
        .unwrap_or(0)
}

/// Build the current status record from the lane snapshots.
pub fn build_status(
    orchestrator: &OrchestratorState,
    stats: &MonitorStats,
    memory_mb: u64,
) -> StatusRecord {
    StatusRecord {
        model_loaded: orchestrator.model_loaded,
        processing: orchestrator.processing,
        current_session: orchestrator.current_session.clone(),
        model_variant: orchestrator.model_variant.clone(),
        memory_mb,
        dropped_chunks: stats.dropped_chunks,
        last_update: Utc::now(),
    }
}

/// Publish status every [`defaults::STATUS_INTERVAL`] and whenever a ping
/// arrives. Exits when the ping channel closes.
pub async fn run_publisher(
    store: RendezvousStore,
    orchestrator_state: watch::Receiver<OrchestratorState>,
    monitor_stats: watch::Receiver<MonitorStats>,
    mut ping: mpsc::UnboundedReceiver<()>,
) {
    let mut system = System::new();
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            warn!("cannot resolve own pid, status memory will read 0: {}", e);
            Pid::from_u32(0)
        }
    };
    let mut ticker = tokio::time::interval(defaults::STATUS_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            ping_received = ping.recv() => {
                if ping_received.is_none() {
                    return;
                }
            }
        }

        let memory_mb = resident_memory_mb(&mut system, pid);
        let record = build_status(
            &orchestrator_state.borrow().clone(),
            &monitor_stats.borrow().clone(),
            memory_mb,
        );
        match record.to_json() {
            Ok(json) => {
                if let Err(e) = store.write_atomic(Channel::Control, names::STATUS, json.as_bytes())
                {
                    warn!("status publish failed: {}", e);
                }
            }
            Err(e) => warn!("status encode failed: {}", e),
        }
    }
}
