//! Fan-out of session events to every connected control client

use tokio::sync::broadcast;
use tracing::trace;

use crate::{
    core::{error::SessionError, sink::EventSink, types::SessionStatus},
    protocol::{JsonRpcNotification, Notification},
};

const NOTIFICATION_CAPACITY: usize = 100;

/// Event sink publishing JSON-RPC notifications on a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<JsonRpcNotification>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.tx.subscribe()
    }

    fn publish(&self, notification: Notification) {
        // No receivers simply means no client is connected
        if self.tx.send(JsonRpcNotification::new(notification)).is_err() {
            trace!("No control client listening");
        }
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn on_status_changed(&self, status: SessionStatus) {
        self.publish(Notification::status_changed(status));
    }

    fn on_value_notified(&self, text: &str) {
        self.publish(Notification::value_notified(text));
    }

    fn on_connection_failed(&self, reason: &SessionError) {
        self.publish(Notification::connection_failed(reason.to_string()));
    }
}
