//! Tally Core - Row and value types shared by the tally crates.
//!
//! - `Value`: a cell value; numeric cells take part in totals
//! - `Row`: a row with a stable identifier, either a leaf or a group of child rows
//! - `Error`: error types for subscription and totals operations
//!
//! # Example
//!
//! ```rust
//! use tally_core::{Row, Value};
//!
//! let leaf = Row::new(2, vec![Value::Int64(10)]);
//! let group = Row::group(1, vec![Value::Int64(10)], true, vec![leaf]);
//!
//! assert!(group.is_collapsed());
//! assert_eq!(group.filtered_children()[0].id(), 2);
//! ```

#![no_std]

extern crate alloc;

mod error;
mod row;
mod value;

pub use error::{Error, Result};
pub use row::{Row, RowId, RowKind};
pub use value::Value;
