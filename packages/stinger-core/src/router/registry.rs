//! Subscription bookkeeping.

use std::collections::HashMap;
use std::fmt;

use super::callback::Callback;
use crate::protocol_constants::CHANNEL_EVENT_SEPARATOR;

/// A `(channel, event)` pair. Renders as `channel:event`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: String,
    pub event: String,
}

impl SubscriptionKey {
    pub fn new(channel: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.channel, CHANNEL_EVENT_SEPARATOR, self.event)
    }
}

/// Key → ordered callbacks, remembering the order keys were first seen.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    callbacks: HashMap<SubscriptionKey, Vec<Callback>>,
    order: Vec<SubscriptionKey>,
}

impl SubscriptionRegistry {
    /// Appends a callback. Returns true if the key had no callbacks before.
    pub(crate) fn add(&mut self, key: SubscriptionKey, callback: Callback) -> bool {
        if !self.callbacks.contains_key(&key) {
            self.order.push(key.clone());
        }
        let list = self.callbacks.entry(key).or_default();
        list.push(callback);
        list.len() == 1
    }

    /// Drops every callback for `key`. The key keeps its position in the order.
    pub(crate) fn clear(&mut self, key: &SubscriptionKey) -> usize {
        self.callbacks
            .get_mut(key)
            .map(|list| std::mem::take(list).len())
            .unwrap_or(0)
    }

    /// Snapshot of the callbacks for `key`, in registration order.
    pub(crate) fn callbacks(&self, key: &SubscriptionKey) -> Vec<Callback> {
        self.callbacks.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn callback_count(&self, key: &SubscriptionKey) -> usize {
        self.callbacks.get(key).map_or(0, Vec::len)
    }

    /// Keys with at least one callback, in first-subscription order.
    pub(crate) fn active_keys(&self) -> impl Iterator<Item = &SubscriptionKey> {
        self.order
            .iter()
            .filter(|key| self.callback_count(key) > 0)
    }
}
