//! Types to pin computation cycles to a moment in time.
//!
//! This module contains [`ValuationTime`], the logical instant a cycle is performed "as of",
//! and [`ResultTimestamp`], the wall-clock moment a result model was finalized.
//!
//! Both are represented as milliseconds since Unix epoch, which is also the unit used to address
//! live data snapshots and computation caches.

use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Logical timestamp a computation cycle is performed "as of".
///
/// The type is implemented as a newtype around `i64` milliseconds since Unix epoch.
/// Valuation times are compared and hashed by value, so two cycles constructed for the same
/// millisecond address the same snapshot and caches.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ValuationTime(i64);

impl ValuationTime {
    /// Create valuation time from milliseconds since Unix epoch.
    pub fn from_epoch_millis(millis: i64) -> Self {
        ValuationTime(millis)
    }

    /// Valuation time matching current wall-clock moment.
    pub fn now() -> Self {
        ValuationTime(epoch_millis(SystemTime::now()))
    }

    /// Milliseconds since Unix epoch.
    pub fn as_epoch_millis(self) -> i64 {
        self.0
    }
}

impl Display for ValuationTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Wall-clock moment at which a result model was finalized.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ResultTimestamp(i64);

impl ResultTimestamp {
    /// Capture current wall-clock moment.
    pub fn now() -> Self {
        ResultTimestamp(epoch_millis(SystemTime::now()))
    }

    /// Milliseconds since Unix epoch.
    pub fn as_epoch_millis(self) -> i64 {
        self.0
    }
}

fn epoch_millis(moment: SystemTime) -> i64 {
    // Moments before epoch are clamped.
    moment
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::ValuationTime;

    #[test]
    fn test_round_trip_millis() {
        let time = ValuationTime::from_epoch_millis(1_284_000_000_123);

        assert_eq!(time.as_epoch_millis(), 1_284_000_000_123);
        assert_eq!(time, ValuationTime::from_epoch_millis(1_284_000_000_123));
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(ValuationTime::now().as_epoch_millis() > 0);
    }
}
