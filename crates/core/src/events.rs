//! Fire-and-forget event channel
//!
//! Publishing is best effort: nothing inside block application may depend on
//! an event being delivered, and a failed delivery never fails the caller.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic, e.g. `proposal:decided`
    pub topic: String,
    /// Event payload
    pub payload: serde_json::Value,
}

/// Sink for best-effort notifications
pub trait EventChannel: Send + Sync {
    /// Publish `payload` under `topic`; must not block
    fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Channel that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChannel;

impl EventChannel for NullChannel {
    fn publish(&self, _topic: &str, _payload: serde_json::Value) {}
}

/// Channel fanning events out to `tokio` broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<Event>,
}

impl BroadcastChannel {
    /// Create a channel buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventChannel for BroadcastChannel {
    fn publish(&self, topic: &str, payload: serde_json::Value) {
        let event = Event {
            topic: topic.to_string(),
            payload,
        };
        if self.sender.send(event).is_err() {
            debug!("No subscribers for event topic {}", topic);
        }
    }
}
