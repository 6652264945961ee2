//! Per-key subscriber registry.
//!
//! `KeyedSubscribers` maps a key to the ordered observers interested in the
//! value published under that key. Subscribing delivers the current value at
//! once; later `notify` calls fan out to everyone still registered.
//!
//! Handles returned by `subscribe_for` reach back into the registry through a
//! `Weak` reference, so an outstanding handle never keeps the registry alive.

use crate::subscription::{fan_out, Subscription, SubscriptionId, SubscriptionManager};
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::ToString;
use core::cell::RefCell;
use core::fmt::Display;
use core::hash::Hash;
use hashbrown::HashMap;
use tally_core::Result;

struct KeyedState<K, V> {
    /// Key -> observers in registration order
    by_key: HashMap<K, SubscriptionManager<V>>,
    /// Next subscription ID, unique across keys and across `clear` calls
    next_id: SubscriptionId,
}

impl<K: Eq + Hash, V> KeyedState<K, V> {
    fn is_live(&self, key: &K, id: SubscriptionId) -> bool {
        self.by_key
            .get(key)
            .map(|observers| observers.contains(id))
            .unwrap_or(false)
    }

    fn remove(&mut self, key: &K, id: SubscriptionId) -> bool {
        let Some(observers) = self.by_key.get_mut(key) else {
            return false;
        };
        let removed = observers.unsubscribe(id);
        if observers.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }
}

/// Registry routing per-key notifications to their observers.
pub struct KeyedSubscribers<K, V> {
    state: Rc<RefCell<KeyedState<K, V>>>,
}

impl<K, V> Default for KeyedSubscribers<K, V>
where
    K: Clone + Eq + Hash + Display + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> KeyedSubscribers<K, V>
where
    K: Clone + Eq + Hash + Display + 'static,
    V: 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(KeyedState {
                by_key: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Subscribes `observer` to `key`.
    ///
    /// `snapshot` is delivered immediately. If that delivery fails nothing is
    /// registered and the error is returned. The returned handle removes the
    /// observer when cancelled.
    pub fn subscribe_for<F>(&self, key: K, snapshot: &V, mut observer: F) -> Result<Subscription>
    where
        F: FnMut(&V) -> Result<()> + 'static,
    {
        observer(snapshot)?;

        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state
                .by_key
                .entry(key.clone())
                .or_default()
                .insert(id, Box::new(observer));
            id
        };

        let state = Rc::downgrade(&self.state);
        Ok(Subscription::new(id, move || {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().remove(&key, id);
            }
        }))
    }

    /// Delivers `value` to every observer of `key` in registration order.
    ///
    /// A key without observers is a no-op. Observer failures are isolated:
    /// everyone still registered is visited before the first failure is
    /// reported.
    pub fn notify(&self, key: &K, value: &V) -> Result<()> {
        let observers = match self.state.borrow().by_key.get(key) {
            Some(observers) => observers.snapshot(),
            None => return Ok(()),
        };

        let state = &self.state;
        fan_out(
            || key.to_string(),
            observers,
            value,
            |id| state.borrow().is_live(key, id),
        )
    }

    /// Removes every registration without notifying anyone.
    ///
    /// Handles issued before the call become inert.
    pub fn clear(&self) {
        self.state.borrow_mut().by_key.clear();
    }

    /// Returns the number of observers registered for `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.state
            .borrow()
            .by_key
            .get(key)
            .map(|observers| observers.len())
            .unwrap_or(0)
    }

    /// Returns the number of observers across all keys.
    pub fn len(&self) -> usize {
        self.state.borrow().by_key.values().map(|o| o.len()).sum()
    }

    /// Returns true if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().by_key.is_empty()
    }
}
