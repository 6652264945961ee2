//! Tally Reactive - single-threaded streams and subscription bookkeeping.
//!
//! This crate provides the building blocks the totals coordinator is wired
//! from. Everything runs on one thread: delivery is a synchronous callback on
//! the emitting call stack, and cancellation is an explicit call on a handle.
//!
//! # Core Concepts
//!
//! - `Subject`: a multicast stream, optionally replaying its latest value
//! - `Subscription`: cancellation handle returned by every subscribe call
//! - `SubscriptionRegistry`: retains handles so they can be released together
//! - `KeyedSubscribers`: per-key observers with immediate-value-then-changes delivery
//! - `DirtySet`: collects changed keys during a turn and drains them once
//!
//! # Example
//!
//! ```ignore
//! use tally_reactive::{KeyedSubscribers, SubscriptionRegistry};
//!
//! let views: KeyedSubscribers<&str, u64> = KeyedSubscribers::new();
//! let mut registry = SubscriptionRegistry::new();
//!
//! registry.add(views.subscribe_for("all", &0, |total| {
//!     println!("total = {total}");
//!     Ok(())
//! })?);
//!
//! views.notify(&"all", &42)?;
//! registry.release_all();
//! ```

#![no_std]

extern crate alloc;

pub mod dirty_set;
pub mod notify;
pub mod observable;
pub mod subscription;

pub use dirty_set::DirtySet;
pub use notify::KeyedSubscribers;
pub use observable::Subject;
pub use subscription::{
    Observer, Subscription, SubscriptionId, SubscriptionManager, SubscriptionRegistry,
};

// Re-export commonly used types from dependencies
pub use tally_core::{Error, Result};
