//! Scan attempt tracking

use tracing::debug;

use crate::core::types::ScanFilter;

/// Outcome of feeding one scan result into an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First advertisement matching the filter; hand off to the connector
    Matched,
    /// Name mismatch, or a repeated advertisement after the first match
    Ignored,
}

/// One scan attempt, alive from `begin_scan` until a match or the timeout
#[derive(Debug)]
pub struct ScanAttempt {
    filter: ScanFilter,
    found: bool,
}

impl ScanAttempt {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            filter: ScanFilter {
                device_name: device_name.into(),
            },
            found: false,
        }
    }

    pub fn filter(&self) -> &ScanFilter {
        &self.filter
    }

    pub fn is_found(&self) -> bool {
        self.found
    }

    /// Handle an advertisement
    ///
    /// Latches `found` on the first match; every later match is ignored.
    pub fn on_scan_result(&mut self, advertised_name: Option<&str>) -> ScanOutcome {
        if advertised_name != Some(self.filter.device_name.as_str()) {
            debug!(?advertised_name, "Scan result does not match filter");
            return ScanOutcome::Ignored;
        }

        if self.found {
            debug!("Repeated advertisement of {}", self.filter.device_name);
            return ScanOutcome::Ignored;
        }

        self.found = true;
        ScanOutcome::Matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_latches() {
        let mut attempt = ScanAttempt::new("MyBLEDevice");
        assert!(!attempt.is_found());

        assert_eq!(
            attempt.on_scan_result(Some("MyBLEDevice")),
            ScanOutcome::Matched
        );
        assert!(attempt.is_found());
    }

    #[test]
    fn test_duplicate_matches_ignored() {
        let mut attempt = ScanAttempt::new("MyBLEDevice");
        let outcomes: Vec<_> = (0..5)
            .map(|_| attempt.on_scan_result(Some("MyBLEDevice")))
            .collect();

        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ScanOutcome::Matched)
                .count(),
            1
        );
        assert_eq!(outcomes[0], ScanOutcome::Matched);
    }

    #[test]
    fn test_other_devices_ignored() {
        let mut attempt = ScanAttempt::new("MyBLEDevice");
        assert_eq!(attempt.on_scan_result(Some("Other")), ScanOutcome::Ignored);
        assert_eq!(attempt.on_scan_result(None), ScanOutcome::Ignored);
        assert!(!attempt.is_found());
    }

    #[test]
    fn test_filter_carries_name() {
        let attempt = ScanAttempt::new("Lock-01");
        assert_eq!(attempt.filter().device_name, "Lock-01");
    }
}
