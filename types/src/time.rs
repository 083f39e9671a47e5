//! Timestamp type used throughout the gate.
//!
//! Timestamps are Unix epoch milliseconds (UTC). Deadlines and throttle
//! windows are computed by saturating arithmetic so a misconfigured
//! interval can never wrap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// This timestamp shifted forward by `millis`.
    pub fn plus_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    pub fn has_expired(&self, duration_millis: u64, now: Timestamp) -> bool {
        now.0 >= self.0.saturating_add(duration_millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_at_boundary() {
        let t = Timestamp::new(1_000);
        assert!(!t.has_expired(500, Timestamp::new(1_499)));
        assert!(t.has_expired(500, Timestamp::new(1_500)));
        assert!(t.has_expired(500, Timestamp::new(2_000)));
    }

    #[test]
    fn elapsed_saturates_backwards() {
        let t = Timestamp::new(1_000);
        assert_eq!(t.elapsed_since(Timestamp::new(400)), 0);
        assert_eq!(t.elapsed_since(Timestamp::new(1_250)), 250);
    }

    #[test]
    fn plus_millis_saturates() {
        let t = Timestamp::new(u64::MAX - 5);
        assert_eq!(t.plus_millis(100).as_millis(), u64::MAX);
    }
}
