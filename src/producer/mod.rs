//! The producer process: capture-side of the rendezvous.
//!
//! The capture lane drives a [`ProducerSession`]; a polling lane turns
//! inbound transcripts, errors, and timeouts into [`ProducerEvent`]s with a
//! single reader. All rendezvous I/O stays off the UI lane.

pub mod monitor;
pub mod session;

pub use monitor::{run_monitor, MonitorCommand, ProducerEvent, ProducerMonitor};
pub use session::{ProducerSession, SessionState};

use crate::error::Result;
use crate::rendezvous::RendezvousStore;
use crate::sink::TextSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// A running producer: the session API plus the event stream.
pub struct ProducerHandle {
    pub session: ProducerSession,
    pub events: mpsc::UnboundedReceiver<ProducerEvent>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl ProducerHandle {
    /// Stop the monitor lane.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
        info!("producer stopped");
    }
}

/// Start the producer lanes over an opened rendezvous.
pub fn start(
    store: RendezvousStore,
    sink: Arc<dyn TextSink>,
    timeout: Duration,
) -> Result<ProducerHandle> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let session = ProducerSession::new(store.clone(), command_tx).with_timeout(timeout);
    let monitor = ProducerMonitor::new(store.clone(), command_rx, event_tx, sink);
    let task = tokio::spawn(run_monitor(monitor, shutdown_rx));

    info!(root = %store.root().display(), "producer started");
    Ok(ProducerHandle {
        session,
        events: event_rx,
        shutdown: shutdown_tx,
        task,
    })
}
