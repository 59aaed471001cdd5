//! Signal Module
//!
//! External refresh triggers and the signal that binds them to a reload.

mod refresh;
mod source;

pub use refresh::{RefreshSignal, RefreshSignalBuilder, PROPERTY_DATA_TRIGGERS, USER_DATA_TRIGGERS};
pub use source::{EventSource, MemoryEventSource, RefreshCallback, Subscription, Topic, Visibility};
