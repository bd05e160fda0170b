//! Session lifecycle state machine
//!
//! The only place that mutates the session status. Transitions outside the
//! allowed set are ignored rather than rejected, since hardware callbacks
//! may arrive duplicated or out of order.

use tracing::debug;

use crate::core::types::SessionStatus;

/// Session state machine
#[derive(Debug)]
pub struct SessionStateMachine {
    status: SessionStatus,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Disconnected,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether `from -> to` is an allowed outgoing transition
    pub fn is_allowed(from: SessionStatus, to: SessionStatus) -> bool {
        use SessionStatus::*;

        matches!(
            (from, to),
            (Disconnected, Scanning)
                | (Scanning, Connecting)
                | (Connecting, Connected)
                | (Connected, Ready)
                | (Scanning | Connecting | Connected | Ready, Disconnected)
        )
    }

    /// Apply a transition
    ///
    /// Returns the new status when the transition was applied, so the caller
    /// emits exactly one notification per applied transition.
    pub fn transition(&mut self, to: SessionStatus) -> Option<SessionStatus> {
        if !Self::is_allowed(self.status, to) {
            debug!(from = %self.status, to = %to, "Ignoring transition");
            return None;
        }

        debug!(from = %self.status, to = %to, "Session transition");
        self.status = to;
        Some(to)
    }

    /// Whether an attempt is in flight
    pub fn is_active(&self) -> bool {
        self.status != SessionStatus::Disconnected
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
