//! Connection attempt with deadline-bounded retry

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::{
    error::SessionError,
    types::{GattStatus, PeripheralId},
};

/// What to do after the transport reported a disconnect while connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLossDecision {
    /// Issue a fresh connect request to the same peripheral
    Retry,
    /// End the attempt
    GiveUp(SessionError),
}

/// Connection attempt state
///
/// The deadline is fixed at the first connect request and is not reset by
/// retries.
#[derive(Debug)]
pub struct ConnectionAttempt {
    peripheral: PeripheralId,
    deadline: Instant,
    timed_out: bool,
    retries: u32,
}

impl ConnectionAttempt {
    pub fn new(peripheral: PeripheralId, started_at: Instant, window: Duration) -> Self {
        Self {
            peripheral,
            deadline: started_at + window,
            timed_out: false,
            retries: 0,
        }
    }

    pub fn peripheral(&self) -> &PeripheralId {
        &self.peripheral
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Latch the timeout; it stays set for the rest of the attempt
    pub fn latch_timeout(&mut self) {
        if !self.timed_out {
            debug!(peripheral = %self.peripheral, "Connection deadline elapsed");
        }
        self.timed_out = true;
    }

    /// Decide on retry after a disconnect with `status`
    pub fn on_link_lost(&mut self, status: GattStatus, now: Instant) -> LinkLossDecision {
        if !status.is_transient() {
            warn!(%status, "Connection closed, not retrying");
            return LinkLossDecision::GiveUp(SessionError::TerminalConnectFailure(status));
        }

        if now >= self.deadline {
            self.latch_timeout();
        }

        if self.timed_out {
            warn!(%status, retries = self.retries, "Connection failed, connection timed out");
            return LinkLossDecision::GiveUp(SessionError::TransientConnectFailure(status));
        }

        self.retries += 1;
        debug!(%status, retry = self.retries, "Connection failed, retrying");
        LinkLossDecision::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(now: Instant) -> ConnectionAttempt {
        ConnectionAttempt::new(
            PeripheralId("AA:BB:CC:DD:EE:FF".to_string()),
            now,
            Duration::from_millis(5000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_before_deadline() {
        let start = Instant::now();
        let mut attempt = attempt(start);

        let at_1s = start + Duration::from_millis(1000);
        let at_3s = start + Duration::from_millis(3000);

        assert_eq!(
            attempt.on_link_lost(GattStatus::DEVICE_UNREACHABLE, at_1s),
            LinkLossDecision::Retry
        );
        assert_eq!(
            attempt.on_link_lost(GattStatus::DEVICE_UNREACHABLE, at_3s),
            LinkLossDecision::Retry
        );
        assert_eq!(attempt.retries(), 2);
        assert!(!attempt.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_after_deadline_gives_up() {
        let start = Instant::now();
        let mut attempt = attempt(start);

        let late = start + Duration::from_millis(5001);
        assert_eq!(
            attempt.on_link_lost(GattStatus::DEVICE_UNREACHABLE, late),
            LinkLossDecision::GiveUp(SessionError::TransientConnectFailure(
                GattStatus::DEVICE_UNREACHABLE
            ))
        );
        assert!(attempt.is_timed_out());
        assert_eq!(attempt.retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latched_timeout_stops_retries() {
        let start = Instant::now();
        let mut attempt = attempt(start);
        attempt.latch_timeout();

        // Even if the clock says otherwise, the latch wins
        assert!(matches!(
            attempt.on_link_lost(GattStatus::DEVICE_UNREACHABLE, start),
            LinkLossDecision::GiveUp(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_codes_are_terminal() {
        let start = Instant::now();
        let mut attempt = attempt(start);

        for status in [
            GattStatus::FAILURE,
            GattStatus::PEER_TERMINATED,
            GattStatus::SUCCESS,
        ] {
            assert_eq!(
                attempt.on_link_lost(status, start),
                LinkLossDecision::GiveUp(SessionError::TerminalConnectFailure(status))
            );
        }
        assert_eq!(attempt.retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_do_not_extend_deadline() {
        let start = Instant::now();
        let mut attempt = attempt(start);

        for ms in [1000, 2000, 3000, 4999] {
            assert_eq!(
                attempt.on_link_lost(
                    GattStatus::DEVICE_UNREACHABLE,
                    start + Duration::from_millis(ms)
                ),
                LinkLossDecision::Retry
            );
        }
        assert!(matches!(
            attempt.on_link_lost(
                GattStatus::DEVICE_UNREACHABLE,
                start + Duration::from_millis(5000)
            ),
            LinkLossDecision::GiveUp(_)
        ));
        assert_eq!(attempt.retries(), 4);
    }
}
