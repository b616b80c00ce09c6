//! Bounded channel reporter
//!
//! Non-blocking handoff from the coordinator to an egress task. Uses a
//! bounded mpsc channel to prevent unbounded memory growth; when the
//! channel is full the event is dropped and counted.

use crate::domain::event::TelemetryEvent;
use crate::infra::metrics::Metrics;
use crate::io::reporter::TelemetryReporter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Sender handle for egress events
///
/// Clone this to share across multiple producers.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<TelemetryEvent>,
    metrics: Arc<Metrics>,
    name: &'static str,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<TelemetryEvent>, metrics: Arc<Metrics>, name: &'static str) -> Self {
        Self { tx, metrics, name }
    }
}

impl TelemetryReporter for EgressSender {
    fn add_event(&self, event: TelemetryEvent) {
        let kind = event.kind();
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_egress_dropped();
                warn!(sink = %self.name, event = %kind.as_str(), "egress_channel_full");
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_egress_dropped();
                debug!(sink = %self.name, event = %kind.as_str(), "egress_channel_closed");
            }
        }
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many events can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
    name: &'static str,
) -> (EgressSender, mpsc::Receiver<TelemetryEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EgressSender::new(tx, metrics, name), rx)
}
