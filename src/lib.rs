//! loadcache - data-loading and caching layer
//!
//! A process-wide TTL cache with rule-driven invalidation, a cache-aside
//! fetch coordinator, per-caller lazy loaders and refresh signals.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod signal;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheControl, CacheStore, ChangeType, InvalidationRules, KeyPattern};
pub use config::Config;
pub use error::{CacheError, FetchError};
pub use loader::{Coalescing, FetchCoordinator, LazyLoader, LoadStatus};
pub use signal::{EventSource, MemoryEventSource, RefreshSignal, Visibility};
