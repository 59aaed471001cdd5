//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The stored value
    pub value: T,
    /// Insertion time
    pub stored_at: Instant,
    /// How long the entry stays fresh after insertion
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry is stale at `now`.
    ///
    /// An entry is fresh while `now - stored_at <= ttl`. A zero TTL is stale
    /// on any read, even one made at the instant of insertion.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        if self.ttl.is_zero() {
            return true;
        }
        now.saturating_duration_since(self.stored_at) > self.ttl
    }

    /// Checks if the entry is stale right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns how long the entry stays fresh, `Duration::ZERO` once stale.
    pub fn ttl_remaining(&self) -> Duration {
        if self.ttl.is_zero() {
            return Duration::ZERO;
        }
        self.ttl.saturating_sub(self.stored_at.elapsed())
    }
}
