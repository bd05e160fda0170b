//! Cancellable timers keyed to the attempt generation

use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::trace;

/// Timers the session arms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ScanTimeout,
    /// Delay between stop-scan and open-transport
    Settle,
    ConnectDeadline,
}

/// Firing delivered to the session queue
///
/// A firing whose generation differs from the current attempt is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Set of pending timers, at most one per kind
#[derive(Debug)]
pub struct TimerSet {
    tx: mpsc::UnboundedSender<TimerFired>,
    pending: HashMap<TimerKind, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
        }
    }

    /// Arm `kind`, replacing a pending timer of the same kind
    pub fn arm(&mut self, kind: TimerKind, generation: u64, delay: Duration) {
        self.cancel(kind);

        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, generation });
        });

        trace!(?kind, generation, ?delay, "Timer armed");
        self.pending.insert(kind, task);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(task) = self.pending.remove(&kind) {
            trace!(?kind, "Timer cancelled");
            task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }

    /// Forget a timer that has fired
    pub fn clear(&mut self, kind: TimerKind) {
        self.pending.remove(&kind);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
