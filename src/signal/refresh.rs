//! Refresh Signal
//!
//! Binds a reload callback to named triggers and to visibility restores.

use std::sync::Arc;

use tracing::debug;

use crate::cache::CacheControl;
use crate::signal::{EventSource, RefreshCallback, Subscription, Topic};

/// Triggers for user-scoped data.
pub const USER_DATA_TRIGGERS: [&str; 2] = ["user_profile_*", "user_properties_*"];

/// Triggers for property data.
pub const PROPERTY_DATA_TRIGGERS: [&str; 2] = ["property_*", "properties_*"];

// == Refresh Signal ==
/// Runs a reload callback whenever one of its triggers fires.
///
/// Trigger names double as cache-key patterns for [`force_refresh`].
/// Publishers may emit the concrete key that changed (`user_profile_42`);
/// the source matches it against the trigger globs.
/// Dropping the signal unsubscribes it from its source.
///
/// [`force_refresh`]: RefreshSignal::force_refresh
pub struct RefreshSignal {
    callback: RefreshCallback,
    triggers: Vec<String>,
    cache: Arc<dyn CacheControl>,
    subscriptions: Vec<Subscription>,
}

impl RefreshSignal {
    pub fn builder(callback: RefreshCallback) -> RefreshSignalBuilder {
        RefreshSignalBuilder {
            callback,
            triggers: Vec::new(),
            on_visibility: true,
        }
    }

    /// Signal preset for user-scoped data.
    pub fn user_data(callback: RefreshCallback) -> RefreshSignalBuilder {
        Self::builder(callback).triggers(USER_DATA_TRIGGERS)
    }

    /// Signal preset for property data.
    pub fn property_data(callback: RefreshCallback) -> RefreshSignalBuilder {
        Self::builder(callback).triggers(PROPERTY_DATA_TRIGGERS)
    }

    /// Runs the callback now.
    pub async fn manual_refresh(&self) {
        debug!("manual refresh");
        (self.callback)().await;
    }

    /// Evicts every key matching a trigger name, then runs the callback.
    ///
    /// Returns the number of evicted entries.
    pub async fn force_refresh(&self) -> usize {
        let removed: usize = self
            .triggers
            .iter()
            .map(|trigger| self.cache.invalidate_pattern(trigger))
            .sum();
        debug!(removed, "force refresh");
        (self.callback)().await;
        removed
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Number of live subscriptions held by this signal.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

// == Builder ==
pub struct RefreshSignalBuilder {
    callback: RefreshCallback,
    triggers: Vec<String>,
    on_visibility: bool,
}

impl RefreshSignalBuilder {
    /// Adds named triggers.
    pub fn triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(triggers.into_iter().map(Into::into));
        self
    }

    /// Whether a hidden to visible transition runs the callback. Defaults to true.
    pub fn on_visibility(mut self, enabled: bool) -> Self {
        self.on_visibility = enabled;
        self
    }

    /// Registers with `source` and returns the live signal.
    pub fn subscribe(self, source: &dyn EventSource, cache: Arc<dyn CacheControl>) -> RefreshSignal {
        let mut subscriptions: Vec<Subscription> = self
            .triggers
            .iter()
            .map(|name| {
                let topic = Topic::named(name.as_str());
                source.subscribe(topic, logged(name.clone(), Arc::clone(&self.callback)))
            })
            .collect();

        if self.on_visibility {
            subscriptions.push(source.subscribe(
                Topic::VisibilityRestored,
                logged(Topic::VisibilityRestored.to_string(), Arc::clone(&self.callback)),
            ));
        }

        RefreshSignal {
            callback: self.callback,
            triggers: self.triggers,
            cache,
            subscriptions,
        }
    }
}

fn logged(trigger: String, callback: RefreshCallback) -> RefreshCallback {
    Arc::new(move || {
        debug!(trigger = %trigger, "refresh trigger fired");
        callback()
    })
}
