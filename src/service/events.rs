//! In-process event side-channel.
//!
//! Every inbound message the dispatcher parses is published here so business
//! logic can subscribe without touching the packet layer. Delivery is best
//! effort: with no subscribers the event is dropped, and a subscriber that
//! falls more than `capacity` events behind skips ahead.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::protocol::incoming::InboundMessage;
use crate::transport::session::ConnectionId;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientEvent {
    pub connection_id: ConnectionId,
    pub message: InboundMessage,
}

impl ClientEvent {
    /// JSON rendering for external sinks.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<ClientEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ClientEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish to current subscribers. Returns how many will see the event.
    pub fn publish(&self, event: ClientEvent) -> usize {
        let header = event.message.header();
        match self.sender.send(Arc::new(event)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(header, "No event subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
