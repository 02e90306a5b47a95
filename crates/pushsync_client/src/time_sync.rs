//! Server clock estimation.
//!
//! Every response may carry `_serverTime` (server clock, ms since the epoch)
//! and `_serverTook` (ms spent handling the request). Combined with the local
//! send and receive instants they give an estimate of the server clock:
//!
//! ```text
//! uncertainty = (receive - send - took) / 2
//! offset      = server_time + took / 2 - (send + receive) / 2
//! ```
//!
//! Estimates are measured on the monotonic clock, relative to when the
//! [`TimeSync`] was created, so wall clock changes do not disturb them.

use parking_lot::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Estimate {
    offset: i64,
    uncertainty: i64,
}

/// Tracks the best known offset between the local monotonic clock and the
/// server clock.
#[derive(Debug)]
pub struct TimeSync {
    origin: Instant,
    estimate: Mutex<Option<Estimate>>,
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new()
    }
}

fn millis_between(from: Instant, to: Instant) -> i64 {
    i64::try_from(to.saturating_duration_since(from).as_millis()).unwrap_or(i64::MAX)
}

fn system_now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

impl TimeSync {
    /// Creates an unsynchronized clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            estimate: Mutex::new(None),
        }
    }

    /// Records a round trip measured with local instants.
    pub fn record(&self, sent: Instant, received: Instant, server_time: i64, server_took: i64) {
        self.record_elapsed(
            millis_between(self.origin, sent),
            millis_between(self.origin, received),
            server_time,
            server_took,
        );
    }

    /// Records a round trip measured in milliseconds since this clock was
    /// created. Returns true if the estimate was replaced.
    pub fn record_elapsed(&self, sent: i64, received: i64, server_time: i64, server_took: i64) -> bool {
        let uncertainty = (received.saturating_sub(sent).saturating_sub(server_took) / 2).max(0);
        let offset = server_time
            .saturating_add(server_took / 2)
            .saturating_sub(sent.saturating_add(received) / 2);

        let mut estimate = self.estimate.lock();
        let accept = match *estimate {
            None => true,
            Some(current) => {
                uncertainty < current.uncertainty
                    || offset.saturating_sub(current.offset).saturating_abs()
                        > uncertainty.saturating_add(current.uncertainty)
            }
        };
        if accept {
            debug!(offset, uncertainty, "updated server time estimate");
            *estimate = Some(Estimate { offset, uncertainty });
        }
        accept
    }

    /// Server time for a moment given in milliseconds since creation, if
    /// synchronized.
    #[must_use]
    pub fn server_time_at(&self, elapsed: i64) -> Option<i64> {
        self.estimate.lock().map(|e| elapsed.saturating_add(e.offset))
    }

    /// Current server time estimate, falling back to the system clock.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.server_time_at(millis_between(self.origin, Instant::now()))
            .unwrap_or_else(system_now_millis)
    }

    /// Uncertainty of the current estimate in milliseconds.
    #[must_use]
    pub fn uncertainty_millis(&self) -> Option<i64> {
        self.estimate.lock().map(|e| e.uncertainty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_taken() {
        let sync = TimeSync::new();
        assert_eq!(sync.server_time_at(0), None);
        assert!(sync.record_elapsed(100, 300, 10_000, 50));
        // offset = 10000 + 25 - 200
        assert_eq!(sync.server_time_at(200), Some(10_025));
        assert_eq!(sync.uncertainty_millis(), Some(75));
    }

    #[test]
    fn extreme_server_values_saturate() {
        let sync = TimeSync::new();
        assert!(sync.record_elapsed(0, 100, i64::MAX, i64::MAX));
        assert_eq!(sync.server_time_at(10), Some(i64::MAX - 40));
        assert_eq!(sync.uncertainty_millis(), Some(0));

        // Wildly inconsistent with the previous sample, so it replaces it.
        assert!(sync.record_elapsed(200, 300, i64::MIN, i64::MIN));
        assert_eq!(sync.server_time_at(0), Some(i64::MIN));
        assert!(sync.uncertainty_millis().unwrap() >= 0);
    }

    #[test]
    fn more_certain_samples_win() {
        let sync = TimeSync::new();
        sync.record_elapsed(0, 1000, 5_000, 0);
        assert!(sync.record_elapsed(2000, 2100, 6_550, 0));
        assert_eq!(sync.uncertainty_millis(), Some(50));
    }

    #[test]
    fn less_certain_consistent_samples_are_ignored() {
        let sync = TimeSync::new();
        sync.record_elapsed(0, 100, 1_050, 0);
        // offset 1000 +/- 50, then 1010 +/- 500: consistent, less certain
        assert!(!sync.record_elapsed(1000, 2000, 2_510, 0));
        assert_eq!(sync.server_time_at(0), Some(1_000));
    }

    #[test]
    fn disagreeing_samples_replace_estimate() {
        let sync = TimeSync::new();
        sync.record_elapsed(0, 100, 1_050, 0);
        // Server clock jumped by an hour.
        assert!(sync.record_elapsed(1000, 1400, 3_601_200, 0));
        assert_eq!(sync.uncertainty_millis(), Some(200));
    }

    #[test]
    fn unsynchronized_clock_uses_system_time() {
        let sync = TimeSync::new();
        let before = system_now_millis();
        let now = sync.now_millis();
        assert!(now >= before);
    }

    #[test]
    fn record_with_instants() {
        let sync = TimeSync::new();
        let sent = Instant::now();
        sync.record(sent, sent, 42_000, 0);
        assert!(sync.now_millis() >= 42_000);
    }
}
