//! Cache Store Module
//!
//! Process-wide key/value store with per-entry TTL, lazy expiry on read,
//! pattern invalidation and rule-driven invalidation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::pattern;
use crate::cache::rules::{ChangeType, InvalidationRules, InvalidationTarget};
use crate::cache::{CacheEntry, CacheStats};
use crate::config::Config;
use crate::tasks::spawn_cleanup_task;

/// Map and counters, guarded together by one lock.
#[derive(Debug)]
struct StoreInner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    stats: CacheStats,
}

// == Cache Store ==
/// Shared TTL cache.
///
/// All operations take `&self`; share the store as `Arc<CacheStore<T>>`.
/// The lock is held only for the duration of a single operation.
#[derive(Debug)]
pub struct CacheStore<T> {
    inner: Mutex<StoreInner<T>>,
    /// TTL used when `set` is called without one
    default_ttl: Duration,
    rules: InvalidationRules,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone> CacheStore<T> {
    // == Constructor ==
    /// Creates a store with a default TTL and a validated rule table.
    pub fn new(default_ttl: Duration, rules: InvalidationRules) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                stats: CacheStats::new(),
            }),
            default_ttl,
            rules,
            sweeper: Mutex::new(None),
        }
    }

    /// Creates a store using the configured TTL and the default rule table.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.default_ttl, InvalidationRules::default_rules())
    }

    // == Get ==
    /// Returns a copy of the value if a fresh entry exists.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                inner.stats.record_hit();
                trace!(key, "cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            inner.stats.record_expirations(1);
            debug!(key, "purged expired entry on read");
        }
        inner.stats.record_miss();
        trace!(key, "cache miss");
        None
    }

    // == Set ==
    /// Stores a value, replacing any previous entry for the key.
    ///
    /// `ttl` falls back to the store's default TTL. A zero TTL is accepted
    /// and makes the entry stale on its next read.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.default_ttl);
        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");

        let mut inner = self.inner.lock();
        inner.entries.insert(key, CacheEntry::new(value, ttl));
    }

    // == Invalidate ==
    /// Removes one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.stats.record_invalidations(1);
            debug!(key, "invalidated entry");
        }
        removed
    }

    // == Invalidate Pattern ==
    /// Removes every stored key matching a `*` glob. Returns the count.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !pattern::matches(pattern, key));
        let removed = before - inner.entries.len();
        inner.stats.record_invalidations(removed);
        debug!(pattern, removed, "invalidated pattern");
        removed
    }

    // == Invalidate On Change ==
    /// Applies the rules registered for a change type given by name.
    ///
    /// Unknown change types remove nothing.
    pub fn invalidate_on_change(&self, change_type: &str, entity_id: Option<&str>) -> usize {
        match change_type.parse::<ChangeType>() {
            Ok(change) => self.invalidate_change(change, entity_id),
            Err(err) => {
                debug!(%err, "ignoring invalidation for unknown change type");
                0
            }
        }
    }

    /// Applies the rules registered for a change type.
    ///
    /// Entity templates with an id remove the substituted key exactly, every
    /// other pattern is matched against all stored keys.
    pub fn invalidate_change(&self, change_type: ChangeType, entity_id: Option<&str>) -> usize {
        let removed = self
            .rules
            .targets(change_type, entity_id)
            .into_iter()
            .map(|target| match target {
                InvalidationTarget::Key(key) => usize::from(self.invalidate(&key)),
                InvalidationTarget::Pattern(glob) => self.invalidate_pattern(&glob),
            })
            .sum();
        debug!(%change_type, entity_id, removed, "applied change invalidation");
        removed
    }

    // == Clear ==
    /// Drops every entry. Returns how many were stored.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.stats.record_invalidations(removed);
        debug!(removed, "cleared cache");
        removed
    }

    // == Cleanup ==
    /// Removes all stale entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - inner.entries.len();
        inner.stats.record_expirations(removed);
        removed
    }

    // == Stats ==
    /// Returns a snapshot of counters and stored keys.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.count = inner.entries.len();
        stats.keys = inner.entries.keys().cloned().collect();
        stats.keys.sort();
        stats
    }

    /// Number of stored entries, including stale ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when nothing is stored, stale entries included.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// TTL applied by `set` when the caller passes none.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Rule table consulted by `invalidate_on_change`.
    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }
}

impl<T: Clone + Send + Sync + 'static> CacheStore<T> {
    // == Sweeper ==
    /// Starts the periodic cleanup task, replacing any running one.
    ///
    /// The task holds only a weak reference and ends once the store is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) {
        let handle = spawn_cleanup_task(Arc::downgrade(self), interval);
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the cleanup task. Returns whether one was running.
    pub fn stop_sweeper(&self) -> bool {
        match self.sweeper.lock().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                debug!("cleanup task stopped");
                was_running
            }
            None => false,
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl<T> Drop for CacheStore<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyPattern;

    fn store() -> CacheStore<String> {
        CacheStore::new(Duration::from_secs(300), InvalidationRules::default_rules())
    }

    #[test]
    fn test_store_new() {
        let store = store();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_accessors_report_stale_entries_and_rules() {
        let store = store();
        store.set("property_1", "v".to_string(), Some(Duration::ZERO));

        assert!(!store.is_empty(), "stale entry stays until purged");
        assert_eq!(store.rules().len(), ChangeType::ALL.len());

        assert!(store.get("property_1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let store = store();

        store.set("key1", "value1".to_string(), None);

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        assert!(store().get("nonexistent").is_none());
    }

    #[test]
    fn test_store_overwrite_replaces_ttl() {
        let store = store();

        store.set("key1", "value1".to_string(), Some(Duration::ZERO));
        store.set("key1", "value2".to_string(), None);

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_ttl_is_stale_on_next_read() {
        let store = store();

        store.set("key1", "value1".to_string(), Some(Duration::ZERO));

        assert!(store.get("key1").is_none());
        assert!(store.is_empty(), "stale entry should be purged by the read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let store = store();

        store.set("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        assert!(store.get("key1").is_some());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(store.get("key1").is_none());
        assert_eq!(store.stats().expirations, 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_invalidate_missing_key_is_noop() {
        let store = store();
        store.set("a", "1".to_string(), None);

        assert!(!store.invalidate("missing"));
        assert!(store.invalidate("a"));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_invalidate_pattern() {
        let store = store();
        store.set("user_properties_42", "a".to_string(), None);
        store.set("user_properties_7", "b".to_string(), None);
        store.set("other_key", "c".to_string(), None);

        assert_eq!(store.invalidate_pattern("user_properties_*"), 2);

        assert!(store.get("user_properties_42").is_none());
        assert!(store.get("user_properties_7").is_none());
        assert_eq!(store.get("other_key").as_deref(), Some("c"));
        assert_eq!(store.invalidate_pattern("nothing_*"), 0);
    }

    #[test]
    fn test_invalidate_on_change_with_and_without_id() {
        let rules = InvalidationRules::new([(
            ChangeType::PropertyUpdate,
            vec![KeyPattern::entity("property_*")],
        )])
        .unwrap();
        let store: CacheStore<u32> = CacheStore::new(Duration::from_secs(60), rules);
        store.set("property_P1", 1, None);
        store.set("property_P2", 2, None);

        assert_eq!(store.invalidate_on_change("property_update", Some("P1")), 1);
        assert!(store.get("property_P1").is_none());
        assert_eq!(store.get("property_P2"), Some(2));

        store.set("property_P1", 1, None);
        assert_eq!(store.invalidate_on_change("property_update", None), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_on_unknown_change_is_noop() {
        let store = store();
        store.set("property_P1", "x".to_string(), None);

        assert_eq!(store.invalidate_on_change("property_renamed", Some("P1")), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalidate_change_without_rules_is_noop() {
        let store: CacheStore<u32> =
            CacheStore::new(Duration::from_secs(60), InvalidationRules::empty());
        store.set("property_P1", 1, None);

        assert_eq!(store.invalidate_change(ChangeType::PropertyUpdate, Some("P1")), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = store();
        store.set("a", "1".to_string(), None);
        store.set("b", "2".to_string(), None);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_stale_entries() {
        let store = store();
        store.set("short", "1".to_string(), Some(Duration::from_secs(1)));
        store.set("long", "2".to_string(), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.cleanup(), 0);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").is_some());
    }

    #[test]
    fn test_store_stats() {
        let store = store();
        store.set("b", "1".to_string(), None);
        store.set("a", "2".to_string(), None);
        store.get("a");
        store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_stop_sweeper() {
        let store = Arc::new(store());
        assert!(!store.is_sweeping());

        store.start_sweeper(Duration::from_secs(60));
        assert!(store.is_sweeping());

        assert!(store.stop_sweeper());
        assert!(!store.is_sweeping());
        assert!(!store.stop_sweeper());
    }
}
