//! Subscription handles and observer bookkeeping.
//!
//! `SubscriptionManager` keeps an ordered list of observers for one stream.
//! `Subscription` is the cancellation handle given back to whoever
//! subscribed, and `SubscriptionRegistry` retains handles so they can be
//! released together.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use tally_core::{Error, Result};

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback invoked with each delivered value.
pub type Observer<T> = Box<dyn FnMut(&T) -> Result<()>>;

pub(crate) type SharedObserver<T> = Rc<RefCell<Observer<T>>>;

/// Ordered set of observers for a single stream.
pub struct SubscriptionManager<T> {
    /// Observers in registration order
    entries: Vec<(SubscriptionId, SharedObserver<T>)>,
    /// Next subscription ID to assign
    next_id: SubscriptionId,
}

impl<T> Default for SubscriptionManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriptionManager<T> {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Registers an observer and returns its ID.
    pub fn subscribe(&mut self, observer: Observer<T>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.insert(id, observer);
        id
    }

    /// Registers an observer under an ID assigned by the caller.
    pub(crate) fn insert(&mut self, id: SubscriptionId, observer: Observer<T>) {
        self.entries.push((id, Rc::new(RefCell::new(observer))));
    }

    /// Unsubscribes by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(sub_id, _)| *sub_id != id);
        self.entries.len() < before
    }

    /// Returns true if `id` is still registered.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|(sub_id, _)| *sub_id == id)
    }

    /// Returns the number of registered observers.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no observers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all subscription IDs in registration order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Clears all observers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copies out the current observer list so delivery can run without
    /// holding a borrow of the owner.
    pub(crate) fn snapshot(&self) -> Vec<(SubscriptionId, SharedObserver<T>)> {
        self.entries.clone()
    }
}

/// Delivers `value` to each observer of `observers` that `is_live` still
/// accepts, in order.
///
/// A failing observer does not stop delivery to the rest. When at least one
/// fails, the returned error summarises the fan-out and keeps the first
/// failure.
pub(crate) fn fan_out<T>(
    target: impl FnOnce() -> String,
    observers: Vec<(SubscriptionId, SharedObserver<T>)>,
    value: &T,
    is_live: impl Fn(SubscriptionId) -> bool,
) -> Result<()> {
    let mut attempted = 0;
    let mut failed = 0;
    let mut first = None;

    for (id, observer) in observers {
        // Cancelled by an earlier observer of this same delivery.
        if !is_live(id) {
            continue;
        }
        attempted += 1;
        let outcome = match observer.try_borrow_mut() {
            Ok(mut callback) => (&mut **callback)(value),
            Err(_) => Err(Error::ReentrantDelivery),
        };
        if let Err(err) = outcome {
            failed += 1;
            first.get_or_insert(err);
        }
    }

    match first {
        None => Ok(()),
        Some(first) => {
            let target = target();
            tracing::warn!(stream = %target, failed, attempted, error = %first, "subscriber delivery failed");
            Err(Error::delivery_failed(target, failed, attempted, first))
        }
    }
}

/// Cancellation handle for a subscription.
///
/// Cancelling is explicit: dropping a handle leaves the subscription in
/// place.
#[must_use = "a dropped Subscription can no longer be cancelled"]
pub struct Subscription {
    id: SubscriptionId,
    canceller: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a handle that runs `cancel` the first time it is cancelled.
    pub fn new<F>(id: SubscriptionId, cancel: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            id,
            canceller: Some(Box::new(cancel)),
        }
    }

    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns whether this handle has not been cancelled yet.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.canceller.is_some()
    }

    /// Cancels the subscription.
    ///
    /// Returns true on the first call, false afterwards.
    pub fn cancel(&mut self) -> bool {
        match self.canceller.take() {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Retains subscription handles so they can all be released together.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    held: Vec<Subscription>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retains a handle until the next `release_all`.
    pub fn add(&mut self, subscription: Subscription) {
        self.held.push(subscription);
    }

    /// Cancels every retained handle and forgets them.
    ///
    /// Returns the number of handles released. Calling it again is a no-op.
    pub fn release_all(&mut self) -> usize {
        let held = core::mem::take(&mut self.held);
        let count = held.len();
        for mut subscription in held {
            subscription.cancel();
        }
        count
    }

    /// Returns the number of retained handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns true if nothing is retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
