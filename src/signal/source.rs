//! Event Source
//!
//! Subscription interface for external refresh triggers, plus an in-process
//! implementation. Nothing here is global: every source is an explicit
//! instance handed to whoever subscribes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::pattern;

/// Async callback run when a trigger fires.
pub type RefreshCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

// == Topic ==
/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Decoupled publish by name
    Named(String),
    /// The hosting context went from hidden to visible
    VisibilityRestored,
}

impl Topic {
    pub fn named(name: impl Into<String>) -> Self {
        Topic::Named(name.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Named(name) => f.write_str(name),
            Topic::VisibilityRestored => f.write_str("visibility_restored"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

// == Subscription ==
/// Handle to a registered callback. Unsubscribes when dropped.
pub struct Subscription {
    topic: Topic,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(topic: Topic, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            topic,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Removes the callback from its source now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// == Event Source Trait ==
/// Anything refresh triggers can be subscribed to.
pub trait EventSource: Send + Sync {
    fn subscribe(&self, topic: Topic, callback: RefreshCallback) -> Subscription;
}

// == Memory Event Source ==
struct SourceInner {
    subscribers: Mutex<HashMap<Topic, Vec<(u64, RefreshCallback)>>>,
    visibility: Mutex<Visibility>,
    next_id: AtomicU64,
}

impl SourceInner {
    fn remove(&self, topic: &Topic, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(topic) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                subscribers.remove(topic);
            }
        }
    }
}

/// In-process event source.
///
/// Callbacks run in subscription order on the publishing task. The source
/// starts out visible.
#[derive(Clone)]
pub struct MemoryEventSource {
    inner: Arc<SourceInner>,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                subscribers: Mutex::new(HashMap::new()),
                visibility: Mutex::new(Visibility::Visible),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Fires every named subscriber whose topic matches `name`. Returns how
    /// many ran.
    ///
    /// Topic names are globs, so publishing `user_profile_42` reaches a
    /// subscriber of `user_profile_*`.
    pub async fn publish(&self, name: &str) -> usize {
        let topic = Topic::named(name);
        self.fire(&topic, |subscribed| match subscribed {
            Topic::Named(glob) => pattern::matches(glob, name),
            Topic::VisibilityRestored => false,
        })
        .await
    }

    /// Records a visibility change.
    ///
    /// Only a hidden to visible transition fires `VisibilityRestored`
    /// subscribers, once each. Returns how many ran.
    pub async fn set_visibility(&self, visibility: Visibility) -> usize {
        let previous = std::mem::replace(&mut *self.inner.visibility.lock(), visibility);
        if previous == Visibility::Hidden && visibility == Visibility::Visible {
            self.fire(&Topic::VisibilityRestored, |subscribed| {
                *subscribed == Topic::VisibilityRestored
            })
            .await
        } else {
            trace!(?previous, ?visibility, "visibility change without restore");
            0
        }
    }

    pub fn visibility(&self) -> Visibility {
        *self.inner.visibility.lock()
    }

    /// Subscribers on one topic, or on all topics.
    pub fn subscriber_count(&self, topic: Option<&Topic>) -> usize {
        let subscribers = self.inner.subscribers.lock();
        match topic {
            Some(topic) => subscribers.get(topic).map_or(0, Vec::len),
            None => subscribers.values().map(Vec::len).sum(),
        }
    }

    async fn fire(&self, topic: &Topic, matches: impl Fn(&Topic) -> bool) -> usize {
        // Snapshot so callbacks run without the lock and may (un)subscribe
        let mut selected: Vec<(u64, RefreshCallback)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|(subscribed, _)| matches(*subscribed))
            .flat_map(|(_, list)| list.iter().map(|(id, cb)| (*id, Arc::clone(cb))))
            .collect();
        selected.sort_by_key(|(id, _)| *id);
        let callbacks: Vec<RefreshCallback> = selected.into_iter().map(|(_, cb)| cb).collect();

        debug!(%topic, subscribers = callbacks.len(), "firing trigger");
        for callback in &callbacks {
            callback().await;
        }
        callbacks.len()
    }
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for MemoryEventSource {
    fn subscribe(&self, topic: Topic, callback: RefreshCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .entry(topic.clone())
            .or_default()
            .push((id, callback));
        trace!(%topic, id, "subscribed");

        let weak: Weak<SourceInner> = Arc::downgrade(&self.inner);
        let cancel_topic = topic.clone();
        Subscription::new(topic, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&cancel_topic, id);
            }
        })
    }
}
