//! Broadcast hub implementing the status and data sinks.
//!
//! The CLI and the integration tests subscribe to an [`EventHub`] to observe what a
//! detector emitted, in order.

use crate::capabilities::{DataSink, StatusMessage, StatusSink};
use crate::data::DataExport;
use tokio::sync::broadcast;

/// Default capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a detector can emit towards the host.
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    Status(StatusMessage),
    Data(Vec<DataExport>),
    TemporaryData(Vec<DataExport>),
}

/// Fan-out of detector events to any number of subscribers.
///
/// Emission never fails: events sent while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<DetectorEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DetectorEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: DetectorEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("detector event dropped, no subscribers");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for EventHub {
    fn emit_status(&self, message: StatusMessage) {
        tracing::debug!(level = ?message.level, "{}", message.text);
        self.send(DetectorEvent::Status(message));
    }
}

impl DataSink for EventHub {
    fn emit_data(&self, data: Vec<DataExport>) {
        self.send(DetectorEvent::Data(data));
    }

    fn emit_data_temp(&self, data: Vec<DataExport>) {
        self.send(DetectorEvent::TemporaryData(data));
    }
}

/// Drain every event currently queued on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<DetectorEvent>) -> Vec<DetectorEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}
