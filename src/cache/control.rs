//! Type-erased cache control surface.
//!
//! Write paths, refresh signals and the admin API only evict and inspect;
//! they never read values, so they depend on this trait instead of the
//! value type of the store.

use crate::cache::{CacheStats, CacheStore};

/// Invalidation and diagnostics over a cache of any value type.
pub trait CacheControl: Send + Sync {
    /// Removes one key. Returns whether it was present.
    fn invalidate(&self, key: &str) -> bool;

    /// Removes every key matching a `*` glob.
    fn invalidate_pattern(&self, pattern: &str) -> usize;

    /// Applies the rule table for a named change type.
    fn invalidate_on_change(&self, change_type: &str, entity_id: Option<&str>) -> usize;

    /// Removes everything.
    fn clear(&self) -> usize;

    /// Removes stale entries.
    fn cleanup(&self) -> usize;

    fn stats(&self) -> CacheStats;
}

impl<T> CacheControl for CacheStore<T>
where
    T: Clone + Send + Sync,
{
    fn invalidate(&self, key: &str) -> bool {
        CacheStore::invalidate(self, key)
    }

    fn invalidate_pattern(&self, pattern: &str) -> usize {
        CacheStore::invalidate_pattern(self, pattern)
    }

    fn invalidate_on_change(&self, change_type: &str, entity_id: Option<&str>) -> usize {
        CacheStore::invalidate_on_change(self, change_type, entity_id)
    }

    fn clear(&self) -> usize {
        CacheStore::clear(self)
    }

    fn cleanup(&self) -> usize {
        CacheStore::cleanup(self)
    }

    fn stats(&self) -> CacheStats {
        CacheStore::stats(self)
    }
}
