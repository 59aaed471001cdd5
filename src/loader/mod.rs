//! Loader Module
//!
//! Cache-aside fetching and the per-caller loader state machine built on it.

mod coordinator;
mod lazy;

pub use coordinator::{Coalescing, FetchCoordinator};
pub use lazy::{FetchFn, LazyLoader, LoadStatus, LoaderBuilder};
