//! Event sink towards the presentation layer

use tokio::sync::mpsc;

use crate::core::{error::SessionError, types::SessionStatus};

/// Receiver of lifecycle and value notifications
///
/// Called from the session task only, one call at a time and in transition
/// order. Implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn on_status_changed(&self, status: SessionStatus);

    fn on_value_notified(&self, text: &str);

    /// One-shot user-visible "connection failed" message
    fn on_connection_failed(&self, _reason: &SessionError) {}
}

/// Everything an [`EventSink`] can observe, as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Status(SessionStatus),
    Value(String),
    ConnectionFailed(SessionError),
}

/// Sink forwarding every event into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_status_changed(&self, status: SessionStatus) {
        let _ = self.tx.send(SinkEvent::Status(status));
    }

    fn on_value_notified(&self, text: &str) {
        let _ = self.tx.send(SinkEvent::Value(text.to_string()));
    }

    fn on_connection_failed(&self, reason: &SessionError) {
        let _ = self.tx.send(SinkEvent::ConnectionFailed(reason.clone()));
    }
}
