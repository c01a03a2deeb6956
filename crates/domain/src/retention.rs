//! Retention windows and the monotonic-timestamp write condition.

use record_store::Condition;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// How long records live in the store before physical expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Days a live record is kept after its last write.
    pub live_days: i64,
    /// Days a tombstone is kept after the delete.
    pub tombstone_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            live_days: 365,
            tombstone_days: 30,
        }
    }
}

impl RetentionPolicy {
    /// Expiry in epoch seconds for a write at `timestamp` (epoch millis).
    pub fn ttl(timestamp: i64, days: i64) -> i64 {
        timestamp.div_euclid(1000) + days * SECONDS_PER_DAY
    }

    /// Expiry for a live record written at `timestamp`.
    pub fn live_ttl(&self, timestamp: i64) -> i64 {
        Self::ttl(timestamp, self.live_days)
    }

    /// Expiry for a tombstone written at `timestamp`.
    pub fn tombstone_ttl(&self, timestamp: i64) -> i64 {
        Self::ttl(timestamp, self.tombstone_days)
    }

    /// Picks the window by whether the write is a delete.
    pub fn ttl_for(&self, timestamp: i64, deleted: bool) -> i64 {
        if deleted {
            self.tombstone_ttl(timestamp)
        } else {
            self.live_ttl(timestamp)
        }
    }
}

/// Condition that only lets a write through if it is newer than what is
/// stored: the stored timestamp is absent or strictly less than `timestamp`.
pub fn timestamp_condition(timestamp: i64) -> Condition {
    Condition::TimestampBefore(timestamp)
}
