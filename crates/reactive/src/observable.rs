//! Single-threaded push streams.
//!
//! A `Subject` is both ends of a stream: producers call `emit`, consumers call
//! `subscribe` and get back a `Subscription` to cancel with. Delivery is
//! synchronous and happens on the emitting call stack.
//!
//! # Example
//!
//! ```ignore
//! use tally_reactive::Subject;
//!
//! let rows = Subject::replaying();
//! rows.emit(3)?;
//!
//! // A replaying subject hands the latest value to new observers right away.
//! let mut sub = rows.subscribe(|n: &i64| {
//!     println!("{n} rows");
//!     Ok(())
//! })?;
//!
//! sub.cancel();
//! ```

use crate::subscription::{fan_out, Subscription, SubscriptionManager};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use core::cell::RefCell;
use tally_core::Result;

struct SubjectState<T> {
    observers: SubscriptionManager<T>,
    latest: Option<T>,
    replay: bool,
}

/// A multicast stream of `T` values.
///
/// Cloning a `Subject` yields another handle to the same stream.
pub struct Subject<T> {
    state: Rc<RefCell<SubjectState<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// Creates a stream that only delivers values emitted after subscribing.
    pub fn new() -> Self {
        Self::with_replay(false)
    }

    /// Creates a stream that delivers its latest value to each new observer
    /// during `subscribe`.
    pub fn replaying() -> Self {
        Self::with_replay(true)
    }

    /// Creates a replaying stream that already holds `value`.
    pub fn replaying_with(value: T) -> Self {
        let subject = Self::replaying();
        subject.state.borrow_mut().latest = Some(value);
        subject
    }

    fn with_replay(replay: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                observers: SubscriptionManager::new(),
                latest: None,
                replay,
            })),
        }
    }

    /// Subscribes `observer` to this stream.
    ///
    /// For a replaying stream holding a value, that value is delivered before
    /// the observer is registered. If that first delivery fails the observer
    /// is dropped and the error is returned.
    pub fn subscribe<F>(&self, mut observer: F) -> Result<Subscription>
    where
        F: FnMut(&T) -> Result<()> + 'static,
    {
        let replay = {
            let state = self.state.borrow();
            if state.replay {
                state.latest.clone()
            } else {
                None
            }
        };
        if let Some(value) = replay {
            observer(&value)?;
        }

        let id = self
            .state
            .borrow_mut()
            .observers
            .subscribe(alloc::boxed::Box::new(observer));

        let state = Rc::downgrade(&self.state);
        Ok(Subscription::new(id, move || {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().observers.unsubscribe(id);
            }
        }))
    }

    /// Pushes `value` to every observer in registration order.
    ///
    /// Observers cancelled while this delivery is running are skipped.
    /// Failures are isolated per observer and reported once all observers
    /// have been visited.
    pub fn emit(&self, value: T) -> Result<()> {
        let observers = {
            let mut state = self.state.borrow_mut();
            if state.replay {
                state.latest = Some(value.clone());
            }
            state.observers.snapshot()
        };
        if observers.is_empty() {
            return Ok(());
        }

        let state = &self.state;
        fan_out(
            || String::from("subject"),
            observers,
            &value,
            |id| state.borrow().observers.contains(id),
        )
    }

    /// Returns the last emitted value of a replaying stream.
    pub fn latest(&self) -> Option<T> {
        self.state.borrow().latest.clone()
    }

    /// Returns the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.state.borrow().observers.len()
    }

    /// Returns true if the two handles refer to the same stream.
    pub fn same_stream(&self, other: &Subject<T>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> core::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let observers = self
            .state
            .try_borrow()
            .map(|s| s.observers.len().to_string())
            .unwrap_or_else(|_| String::from("<busy>"));
        f.debug_struct("Subject").field("observers", &observers).finish()
    }
}
