//! Keyed publish/subscribe on top of [`Signal`].
//!
//! An [`EventBus<K, E>`] maps topic keys to signals. Subscribers register for
//! one topic and receive only the events emitted on it. Models use it for
//! `change` and `change:<path>` topics; collections use it to fan attribute
//! changes out to passthrough subscribers.
//!
//! Topics with no remaining subscribers are pruned, so `emit` on a key nobody
//! listens to is a single hash lookup.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::signal::{ConnectionId, Signal};

new_key_type! {
    /// Handle for one subscription on an [`EventBus`].
    pub struct SubscriptionId;
}

struct BusState<K, E> {
    topics: HashMap<K, Arc<Signal<E>>>,
    subscriptions: SlotMap<SubscriptionId, (K, ConnectionId)>,
}

/// A keyed collection of signals.
pub struct EventBus<K, E> {
    state: Mutex<BusState<K, E>>,
}

impl<K, E> Default for EventBus<K, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> EventBus<K, E>
where
    K: Eq + Hash + Clone + Send + 'static,
    E: Send + 'static,
{
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                topics: HashMap::new(),
                subscriptions: SlotMap::with_key(),
            }),
        }
    }

    /// Register `slot` for events on `key`.
    pub fn subscribe<F>(&self, key: K, slot: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let signal = state
            .topics
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Signal::new()))
            .clone();
        let connection = signal.connect(slot);
        state.subscriptions.insert((key, connection))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let Some((key, connection)) = state.subscriptions.remove(id) else {
            return false;
        };
        let now_empty = match state.topics.get(&key) {
            Some(signal) => {
                signal.disconnect(connection);
                signal.connection_count() == 0
            }
            None => false,
        };
        if now_empty {
            state.topics.remove(&key);
        }
        true
    }

    /// Remove every subscription on every topic.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.topics.clear();
        state.subscriptions.clear();
    }

    /// Deliver `event` to the subscribers of `key`.
    ///
    /// Returns `true` if the topic had subscribers.
    pub fn emit(&self, key: &K, event: E) -> bool {
        let signal = self.state.lock().topics.get(key).cloned();
        match signal {
            Some(signal) => {
                signal.emit(event);
                true
            }
            None => false,
        }
    }

    /// Whether anyone listens on `key`.
    pub fn has_subscribers(&self, key: &K) -> bool {
        self.state.lock().topics.contains_key(key)
    }

    /// Total number of live subscriptions across all topics.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Keys that currently have subscribers.
    pub fn topics(&self) -> Vec<K> {
        self.state.lock().topics.keys().cloned().collect()
    }
}
