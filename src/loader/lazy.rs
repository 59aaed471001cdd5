//! Lazy Loader
//!
//! Per-caller state machine turning a cache-backed fetch into observable
//! idle/loading/loaded/errored status.
//!
//! A loader never runs two loads at once: a `load` issued while another is
//! in flight awaits the running one and observes its outcome. Loaders only
//! coordinate with each other through the shared [`CacheStore`].
//!
//! [`CacheStore`]: crate::cache::CacheStore

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::FetchError;
use crate::loader::FetchCoordinator;
use crate::signal::RefreshCallback;

/// Injected fetch operation, callable once per load.
pub type FetchFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

// == Load Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Errored,
}

type LoadFlight = Shared<BoxFuture<'static, ()>>;

struct LoaderState<T, E> {
    data: Option<T>,
    status: LoadStatus,
    last_error: Option<E>,
    /// Set after a successful load; a plain `load` is skipped while set
    loaded: bool,
    /// Bumped whenever the loaded marker is cleared. A cycle only marks the
    /// loader loaded if no reset happened while it ran.
    generation: u64,
    dependencies: Vec<Value>,
    flight: Option<(u64, LoadFlight)>,
    cycles: u64,
}

struct LoaderShared<T, E> {
    key: String,
    ttl: Option<Duration>,
    immediate: bool,
    fetch: FetchFn<T, E>,
    coordinator: Arc<FetchCoordinator<T, E>>,
    state: Mutex<LoaderState<T, E>>,
}

impl<T, E> LoaderShared<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    async fn load(self: &Arc<Self>) {
        let flight = {
            let mut state = self.state.lock();
            let running = state.flight.as_ref().map(|(_, flight)| flight.clone());
            if let Some(flight) = running {
                trace!(key = %self.key, "load already in flight, awaiting it");
                flight
            } else if state.loaded {
                trace!(key = %self.key, "already loaded, skipping");
                return;
            } else {
                let cycle = state.cycles;
                state.cycles += 1;
                state.status = LoadStatus::Loading;
                state.last_error = None;

                let flight = self.start_cycle(cycle, state.generation);
                state.flight = Some((cycle, flight.clone()));
                flight
            }
        };

        flight.await;
    }

    /// Waits for the running cycle, if any, without starting one.
    async fn settle(&self) {
        let running = self
            .state
            .lock()
            .flight
            .as_ref()
            .map(|(_, flight)| flight.clone());
        if let Some(flight) = running {
            flight.await;
        }
    }

    /// Spawns the load cycle so it completes even if every caller stops
    /// awaiting it. The task holds no strong reference to the loader, so an
    /// abandoned loader can be dropped mid-flight; the fetched value still
    /// reaches the cache.
    fn start_cycle(self: &Arc<Self>, cycle: u64, generation: u64) -> LoadFlight {
        let weak: Weak<Self> = Arc::downgrade(self);
        let coordinator = Arc::clone(&self.coordinator);
        let fetch = Arc::clone(&self.fetch);
        let key = self.key.clone();
        let ttl = self.ttl;

        let handle = tokio::spawn(async move {
            debug!(key = %key, cycle, "load started");
            let result = coordinator.get_or_fetch(&key, move || fetch(), ttl).await;

            let Some(shared) = weak.upgrade() else {
                debug!(key = %key, cycle, "loader dropped before load finished");
                return;
            };
            let mut state = shared.state.lock();
            match result {
                Ok(value) => {
                    state.data = Some(value);
                    state.status = LoadStatus::Loaded;
                    if state.generation == generation {
                        state.loaded = true;
                    }
                    debug!(key = %key, cycle, "load finished");
                }
                Err(err) => {
                    warn!(key = %key, cycle, error = %err, "load failed");
                    state.last_error = Some(err);
                    state.status = LoadStatus::Errored;
                }
            }
            if state.flight.as_ref().map_or(false, |(id, _)| *id == cycle) {
                state.flight = None;
            }
        });

        async move {
            if let Err(err) = handle.await {
                warn!(error = %err, "load task did not complete");
            }
        }
        .boxed()
        .shared()
    }

    fn reset_loaded(&self) {
        let mut state = self.state.lock();
        state.loaded = false;
        state.generation += 1;
    }

    async fn reload(self: &Arc<Self>) {
        self.reset_loaded();
        self.load().await;
    }
}

// == Lazy Loader ==
/// Cache-backed loader owned by one caller.
pub struct LazyLoader<T, E = FetchError> {
    shared: Arc<LoaderShared<T, E>>,
}

impl<T, E> LazyLoader<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    /// Starts building a loader for `key` backed by `fetch`.
    pub fn builder<F, Fut>(key: impl Into<String>, fetch: F) -> LoaderBuilder<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        LoaderBuilder {
            key: key.into(),
            fetch: Arc::new(move || fetch().boxed()),
            ttl: None,
            dependencies: Vec::new(),
            immediate: true,
        }
    }

    /// Runs the initial load when the loader is configured for immediate loading.
    pub async fn start(&self) {
        if self.shared.immediate {
            self.load().await;
        }
    }

    // == Load ==
    /// Loads through the cache unless already loaded.
    ///
    /// While a load is in flight further calls await that load instead of
    /// starting another. A failure keeps the previous data. The cycle runs
    /// as its own task, so dropping this future does not cancel it.
    pub async fn load(&self) {
        self.shared.load().await;
    }

    /// Clears the loaded marker and loads again. The cache is still
    /// consulted first, so a fresh entry answers without fetching.
    pub async fn reload(&self) {
        self.shared.reload().await;
    }

    /// Evicts this loader's key and clears the loaded marker without fetching.
    pub fn invalidate_cache(&self) {
        self.shared.coordinator.cache().invalidate(&self.shared.key);
        self.shared.reset_loaded();
        debug!(key = %self.shared.key, "loader cache invalidated");
    }

    // == Dependencies ==
    /// Records a new dependency tuple.
    ///
    /// When it differs by value from the previous one the loaded marker is
    /// cleared and, for immediate loaders, one load runs. Returns whether the
    /// tuple changed.
    pub async fn set_dependencies<I, V>(&self, dependencies: I) -> bool
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let dependencies: Vec<Value> = dependencies.into_iter().map(Into::into).collect();
        let changed = {
            let mut state = self.shared.state.lock();
            if state.dependencies == dependencies {
                false
            } else {
                state.dependencies = dependencies;
                state.loaded = false;
                state.generation += 1;
                true
            }
        };

        if changed {
            debug!(key = %self.shared.key, "dependencies changed");
            if self.shared.immediate {
                // A cycle started under the old tuple does not count
                self.shared.settle().await;
                self.load().await;
            }
        }
        changed
    }

    /// Callback that reloads this loader, for use with a refresh signal.
    ///
    /// Holds only a weak reference; once the loader is dropped the callback
    /// does nothing.
    pub fn reload_callback(&self) -> RefreshCallback {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    shared.reload().await;
                }
            }
            .boxed()
        })
    }

    // == Accessors ==
    pub fn data(&self) -> Option<T> {
        self.shared.state.lock().data.clone()
    }

    pub fn status(&self) -> LoadStatus {
        self.shared.state.lock().status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == LoadStatus::Loading
    }

    pub fn error(&self) -> Option<E> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn dependencies(&self) -> Vec<Value> {
        self.shared.state.lock().dependencies.clone()
    }

    /// Number of load cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.shared.state.lock().cycles
    }
}

// == Loader Builder ==
/// Construction parameters for a [`LazyLoader`].
pub struct LoaderBuilder<T, E> {
    key: String,
    fetch: FetchFn<T, E>,
    ttl: Option<Duration>,
    dependencies: Vec<Value>,
    immediate: bool,
}

impl<T, E> LoaderBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + std::fmt::Display + 'static,
{
    /// TTL for values this loader stores. Defaults to the store's TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Initial dependency tuple.
    pub fn dependencies<I, V>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `start` and dependency changes load automatically. Defaults to true.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn build(self, coordinator: Arc<FetchCoordinator<T, E>>) -> LazyLoader<T, E> {
        LazyLoader {
            shared: Arc::new(LoaderShared {
                key: self.key,
                ttl: self.ttl,
                immediate: self.immediate,
                fetch: self.fetch,
                coordinator,
                state: Mutex::new(LoaderState {
                    data: None,
                    status: LoadStatus::Idle,
                    last_error: None,
                    loaded: false,
                    generation: 0,
                    dependencies: self.dependencies,
                    flight: None,
                    cycles: 0,
                }),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, InvalidationRules};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator() -> Arc<FetchCoordinator<u32>> {
        let cache = Arc::new(CacheStore::new(
            Duration::from_secs(60),
            InvalidationRules::empty(),
        ));
        Arc::new(FetchCoordinator::new(cache))
    }

    /// Fetch that counts calls, sleeps 100ms and returns the call number.
    fn counting_loader(calls: &Arc<AtomicUsize>) -> LoaderBuilder<u32, FetchError> {
        let calls = Arc::clone(calls);
        LazyLoader::builder("user_properties_42", move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<u32, FetchError>(n as u32)
            }
        })
    }

    #[tokio::test]
    async fn test_new_loader_is_idle() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        assert_eq!(loader.status(), LoadStatus::Idle);
        assert!(loader.data().is_none());
        assert!(loader.error().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_success() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(Arc::clone(&coordinator));

        loader.load().await;

        assert_eq!(loader.status(), LoadStatus::Loaded);
        assert_eq!(loader.data(), Some(1));
        assert_eq!(coordinator.cache().get("user_properties_42"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_loads_fetch_once() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        let observed = tokio::join!(
            async {
                loader.load().await;
                loader.status()
            },
            async {
                loader.load().await;
                loader.status()
            },
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.cycles(), 1);
        assert_eq!(observed, (LoadStatus::Loaded, LoadStatus::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_loading_while_in_flight() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        let mut pending = Box::pin(loader.load());
        tokio_test::assert_pending!(futures::poll!(&mut pending));
        assert!(loader.is_loading());

        pending.await;
        assert_eq!(loader.status(), LoadStatus::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_when_loaded_is_skipped() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        loader.load().await;
        loader.load().await;

        assert_eq!(loader.cycles(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_consults_cache_first() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        loader.load().await;
        loader.reload().await;

        assert_eq!(loader.cycles(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "fresh entry answers the reload");
        assert_eq!(loader.data(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_cache_then_load_fetches() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(Arc::clone(&coordinator));

        loader.load().await;
        loader.invalidate_cache();

        assert!(coordinator.cache().get("user_properties_42").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "invalidation alone does not fetch");

        loader.load().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.data(), Some(2));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_data() {
        let coordinator = coordinator();
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fail_flag = Arc::clone(&fail);
        let loader = LazyLoader::builder("property_P1", move || {
            let fail = fail_flag.load(Ordering::SeqCst);
            async move {
                if fail {
                    Err(FetchError::Upstream("503".to_string()))
                } else {
                    Ok(10)
                }
            }
        })
        .build(Arc::clone(&coordinator));

        loader.load().await;
        assert_eq!(loader.data(), Some(10));

        fail.store(true, Ordering::SeqCst);
        loader.invalidate_cache();
        loader.load().await;

        assert_eq!(loader.status(), LoadStatus::Errored);
        assert!(matches!(loader.error(), Some(FetchError::Upstream(_))));
        assert_eq!(loader.data(), Some(10));
        assert!(coordinator.cache().get("property_P1").is_none());

        // A failed load leaves the loader eligible for another attempt
        fail.store(false, Ordering::SeqCst);
        loader.load().await;
        assert_eq!(loader.status(), LoadStatus::Loaded);
        assert!(loader.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_change_triggers_one_cycle() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls)
            .dependencies([42])
            .build(coordinator);

        loader.start().await;
        assert_eq!(loader.cycles(), 1);

        assert!(!loader.set_dependencies([42]).await);
        assert_eq!(loader.cycles(), 1);

        assert!(loader.set_dependencies([43]).await);
        assert_eq!(loader.cycles(), 2);
        assert_eq!(loader.status(), LoadStatus::Loaded);
        assert_eq!(loader.dependencies(), vec![Value::from(43)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_change_without_immediate_only_resets_marker() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls)
            .dependencies(["a"])
            .immediate(false)
            .build(coordinator);

        loader.start().await;
        assert_eq!(loader.cycles(), 0);

        loader.load().await;
        assert!(loader.set_dependencies(["b"]).await);
        assert_eq!(loader.cycles(), 1);

        // Marker was cleared, so the next explicit load runs
        loader.load().await;
        assert_eq!(loader.cycles(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_change_during_load_is_not_lost() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls)
            .dependencies(["a"])
            .immediate(false)
            .build(coordinator);

        tokio::join!(loader.load(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(loader.set_dependencies(["b"]).await);
        });
        assert_eq!(loader.cycles(), 1);
        assert_eq!(loader.status(), LoadStatus::Loaded);

        // The finished cycle ran under the old tuple, so this one is not skipped
        loader.load().await;
        assert_eq!(loader.cycles(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_dependency_change_during_load_runs_new_cycle() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls)
            .dependencies([42])
            .build(coordinator);

        tokio::join!(loader.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(loader.set_dependencies([43]).await);
        });

        assert_eq!(loader.cycles(), 2);
        assert_eq!(loader.status(), LoadStatus::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_load_clears_marker() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        tokio::join!(loader.load(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            loader.invalidate_cache();
        });
        assert_eq!(loader.cycles(), 1);

        loader.load().await;
        assert_eq!(loader.cycles(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_load_still_completes() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(Arc::clone(&coordinator));

        let timed_out = tokio::time::timeout(Duration::from_millis(10), loader.load()).await;
        assert!(timed_out.is_err());
        assert!(loader.is_loading());

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(loader.status(), LoadStatus::Loaded);
        assert_eq!(loader.data(), Some(1));
        assert_eq!(coordinator.cache().get("user_properties_42"), Some(1));

        loader.load().await;
        assert_eq!(loader.cycles(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_loader_still_caches_fetched_value() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(Arc::clone(&coordinator));

        let _ = tokio::time::timeout(Duration::from_millis(10), loader.load()).await;
        drop(loader);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(coordinator.cache().get("user_properties_42"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_callback_outlives_loader_safely() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls).build(coordinator);

        let callback = loader.reload_callback();
        callback().await;
        assert_eq!(loader.cycles(), 1);

        drop(loader);
        callback().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
