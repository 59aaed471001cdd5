//! Fetch Coordinator
//!
//! Cache-aside reads: answer from the store when fresh, otherwise run the
//! injected fetch once and store its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::FetchError;

// == Coalescing Mode ==
/// Whether concurrent misses for one key share a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coalescing {
    /// Every miss runs its own fetch.
    #[default]
    Disabled,
    /// The first miss runs the fetch; concurrent misses await its result.
    Enabled,
}

impl From<bool> for Coalescing {
    fn from(enabled: bool) -> Self {
        if enabled {
            Coalescing::Enabled
        } else {
            Coalescing::Disabled
        }
    }
}

type InFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// A running fetch, tagged so only its own completion clears the slot.
struct Slot<T, E> {
    id: u64,
    flight: InFlight<T, E>,
}

type SlotMap<T, E> = Arc<Mutex<HashMap<String, Slot<T, E>>>>;

// == Fetch Coordinator ==
/// Cache-aside reader over a shared [`CacheStore`].
///
/// Fetch failures are returned unchanged and never cached, so the next call
/// retries.
pub struct FetchCoordinator<T, E = FetchError> {
    cache: Arc<CacheStore<T>>,
    coalescing: Coalescing,
    in_flight: SlotMap<T, E>,
    next_id: AtomicU64,
}

impl<T, E> FetchCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a coordinator that fetches on every miss.
    pub fn new(cache: Arc<CacheStore<T>>) -> Self {
        Self::with_coalescing(cache, Coalescing::Disabled)
    }

    pub fn with_coalescing(cache: Arc<CacheStore<T>>, coalescing: Coalescing) -> Self {
        Self {
            cache,
            coalescing,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Creates a coordinator with the configured coalescing mode.
    pub fn from_config(cache: Arc<CacheStore<T>>, config: &Config) -> Self {
        Self::with_coalescing(cache, Coalescing::from(config.coalesce_fetches))
    }

    pub fn cache(&self) -> &Arc<CacheStore<T>> {
        &self.cache
    }

    pub fn coalescing(&self) -> Coalescing {
        self.coalescing
    }

    /// Number of fetches currently shared through the in-flight table.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    // == Get Or Fetch ==
    /// Returns the cached value for `key`, fetching and storing it on a miss.
    ///
    /// `fetch` is only invoked on a miss. Its future runs without any cache
    /// lock held. `ttl` falls back to the store default.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }

        match self.coalescing {
            Coalescing::Disabled => self.fetch_and_store(key, fetch, ttl).await,
            Coalescing::Enabled => self.join_or_start(key, fetch, ttl).await,
        }
    }

    // == Refresh ==
    /// Drops the cached entry and runs `fetch` exactly once.
    ///
    /// With coalescing enabled the new fetch takes over the key's slot, so
    /// later misses join it. A fetch it superseded still answers its own
    /// waiters but no longer writes the cache.
    pub async fn refresh<F, Fut>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.cache.invalidate(key);
        match self.coalescing {
            Coalescing::Disabled => self.fetch_and_store(key, fetch, ttl).await,
            Coalescing::Enabled => self.replace_flight(key, fetch, ttl).await,
        }
    }

    async fn fetch_and_store<F, Fut>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        debug!(key, "cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                self.cache.set(key, value.clone(), ttl);
                Ok(value)
            }
            Err(err) => {
                debug!(key, "fetch failed, nothing cached");
                Err(err)
            }
        }
    }

    async fn join_or_start<F, Fut>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut slots = self.in_flight.lock();
            match slots.get(key).map(|slot| slot.flight.clone()) {
                Some(flight) => {
                    debug!(key, "joining in-flight fetch");
                    flight
                }
                None => {
                    // A leader may have finished between the first read and the lock
                    if let Some(value) = self.cache.get(key) {
                        return Ok(value);
                    }

                    debug!(key, "cache miss, starting shared fetch");
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let flight = self.start_flight(key.to_string(), id, fetch(), ttl);
                    slots.insert(
                        key.to_string(),
                        Slot {
                            id,
                            flight: flight.clone(),
                        },
                    );
                    flight
                }
            }
        };

        flight.await
    }

    async fn replace_flight<F, Fut>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut slots = self.in_flight.lock();
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let flight = self.start_flight(key.to_string(), id, fetch(), ttl);
            let previous = slots.insert(
                key.to_string(),
                Slot {
                    id,
                    flight: flight.clone(),
                },
            );
            if previous.is_some() {
                debug!(key, "refresh superseded in-flight fetch");
            }
            flight
        };

        flight.await
    }

    fn start_flight<Fut>(&self, key: String, id: u64, fut: Fut, ttl: Option<Duration>) -> InFlight<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let slots = Arc::clone(&self.in_flight);

        async move {
            let result = fut.await;

            // Slot lock spans the write so joiners never miss both
            {
                let mut slots = slots.lock();
                let owner = slots.get(&key).map_or(false, |slot| slot.id == id);
                match &result {
                    Ok(value) if owner => cache.set(key.clone(), value.clone(), ttl),
                    Ok(_) => debug!(key = %key, "superseded fetch finished, not cached"),
                    Err(_) => debug!(key = %key, "shared fetch failed, nothing cached"),
                }
                if owner {
                    slots.remove(&key);
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}
