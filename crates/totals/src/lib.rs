//! Tally Totals - live "all rows" and "filtered rows" summaries.
//!
//! This crate keeps two totals entities in step with an upstream row source
//! and republishes them as per-key streams for views to observe.
//!
//! # Core Concepts
//!
//! - `RowSource`: the upstream table (pull accessor plus batch and per-row streams)
//! - `TotalsEntity`: a summary row; `Totals` is the column-sum implementation
//! - `TotalsCoordinator`: subscribes upstream, expands collapsed groups,
//!   follows the metrics of one representative row, and coalesces change
//!   notifications so each upstream event announces each summary once
//! - `MemoryRowSource`: an in-process `RowSource`

#![no_std]

extern crate alloc;

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod expand;
pub mod source;

pub use config::CoordinatorConfig;
pub use coordinator::TotalsCoordinator;
pub use entity::{RowPredicate, RowSupplier, Totals, TotalsEntity, TotalsKey};
pub use expand::expand_collapsed;
pub use source::{MemoryRowSource, RowSource};

// Re-export commonly used types from dependencies
pub use tally_core::{Error, Result, Row, RowId, RowKind, Value};
pub use tally_reactive::{Subject, Subscription, SubscriptionRegistry};
