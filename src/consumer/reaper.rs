//! Orphan cleanup and log rotation.
//!
//! Process crashes leave rendezvous files behind; the reaper guarantees
//! bounded residue. One sweep at startup removes anything older than an
//! hour, then a minute-cadence sweep enforces the per-kind retention
//! bounds. The audit log is rotated by size and its archives by age.

use crate::consumer::audit::AuditLog;
use crate::defaults;
use crate::rendezvous::{names, Channel, RendezvousStore};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Counts from one sweep, for the audit trail.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
}

/// Delete entries in `channel` older than `max_age`, keeping any name for
/// which `keep` returns true.
fn sweep_channel(
    store: &RendezvousStore,
    channel: Channel,
    max_age: Duration,
    now: SystemTime,
    keep: impl Fn(&str) -> bool,
) -> SweepReport {
    let mut report = SweepReport::default();
    let entries = match store.list(channel) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("reaper cannot list {:?}: {}", channel, e);
            return report;
        }
    };
    for entry in entries {
        if keep(&entry.name) {
            continue;
        }
        let age = now.duration_since(entry.mtime).unwrap_or(Duration::ZERO);
        if age > max_age {
            match store.delete(channel, &entry.name) {
                Ok(()) => report.deleted += 1,
                Err(e) => warn!("reaper cannot delete {}: {}", entry.name, e),
            }
        }
    }
    report
}

/// Temp siblings are invisible to [`RendezvousStore::list`], so a write
/// that crashed between the temp write and the rename would otherwise leak
/// forever. Walk each channel directory raw and delete `.tmp` entries past
/// the temp age bound.
fn sweep_temp_files(store: &RendezvousStore, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    for channel in Channel::all() {
        let dir = store.root().join(channel.dir_name());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("reaper cannot scan {:?} for temp files: {}", channel, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".tmp") {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > defaults::TEMP_FILE_MAX_AGE {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => report.deleted += 1,
                    Err(e) => warn!("reaper cannot delete temp file {}: {}", name, e),
                }
            }
        }
    }
    report
}

/// Startup sweep: anything in `audio/`, `transcripts/`, `control/` older
/// than an hour is residue from a crashed process, as is any stale temp
/// sibling in any channel. Settings are preserved.
pub fn startup_sweep(store: &RendezvousStore, now: SystemTime) -> SweepReport {
    let mut total = SweepReport::default();
    for channel in [Channel::Audio, Channel::Transcripts, Channel::Control] {
        let report = sweep_channel(store, channel, defaults::STARTUP_SWEEP_MAX_AGE, now, |_| false);
        total.deleted += report.deleted;
    }
    total.deleted += sweep_temp_files(store, now).deleted;
    if total.deleted > 0 {
        info!(deleted = total.deleted, "startup sweep removed stale rendezvous files");
    }
    total
}

/// Periodic sweep: audio chunks older than 60s, partials older than 5min,
/// crashed temp siblings past their own bound. The final transcript and
/// control records are left to their own overwrite/delete-on-consume
/// discipline.
pub fn periodic_sweep(store: &RendezvousStore, now: SystemTime) -> SweepReport {
    let mut total = SweepReport::default();

    let report = sweep_channel(store, Channel::Audio, defaults::AUDIO_MAX_AGE, now, |_| false);
    total.deleted += report.deleted;

    let report = sweep_channel(store, Channel::Transcripts, defaults::PARTIAL_MAX_AGE, now, |name| {
        !names::is_partial(name)
    });
    total.deleted += report.deleted;

    total.deleted += sweep_temp_files(store, now).deleted;

    total
}

/// Rotate the audit log once it exceeds the size bound, and delete archives
/// past the age bound. Archives live beside the log with an epoch suffix.
pub fn rotate_audit_log(audit: &AuditLog, now: SystemTime) {
    if audit.size_bytes() > defaults::AUDIT_LOG_MAX_BYTES {
        let epoch = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let archive = audit.path().with_extension(format!("log.{epoch}"));
        match std::fs::rename(audit.path(), &archive) {
            Ok(()) => info!(archive = %archive.display(), "audit log rotated"),
            Err(e) => warn!("audit rotation failed: {}", e),
        }
    }

    prune_audit_archives(audit, now);
}

fn prune_audit_archives(audit: &AuditLog, now: SystemTime) {
    let Some(dir) = audit.path().parent() else {
        return;
    };
    let Some(stem) = audit.path().file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    let prefix = format!("{stem}.log.");
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot scan audit archives: {}", e);
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }
        // Only prune our own epoch-suffixed archives.
        if name[prefix.len()..].parse::<u64>().is_err() {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(modified) = metadata.modified() else { continue };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > defaults::AUDIT_ARCHIVE_MAX_AGE {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!("cannot delete audit archive {}: {}", name, e);
            }
        }
    }
}

/// Run the reaper lane: startup sweep immediately, then the periodic sweep
/// and rotation every minute until the shutdown signal resolves.
pub async fn run_reaper(
    store: RendezvousStore,
    audit: AuditLog,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let report = startup_sweep(&store, SystemTime::now());
    if report.deleted > 0 {
        audit.record(&format!("event=startup_sweep deleted={}", report.deleted));
    }

    let mut ticker = tokio::time::interval(defaults::REAPER_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the immediate first tick; startup already swept.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = SystemTime::now();
                let report = periodic_sweep(&store, now);
                if report.deleted > 0 {
                    audit.record(&format!("event=periodic_sweep deleted={}", report.deleted));
                }
                rotate_audit_log(&audit, now);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
