//! Cache Module
//!
//! In-memory TTL cache with pattern and rule-driven invalidation.

mod control;
mod entry;
pub mod pattern;
mod rules;
mod stats;
mod store;


// Re-export public types
pub use control::CacheControl;
pub use entry::CacheEntry;
pub use rules::{ChangeType, InvalidationRules, InvalidationTarget, KeyPattern, UnknownChangeType};
pub use stats::CacheStats;
pub use store::CacheStore;
