//! Row structure for live tables.
//!
//! A `Row` is either a plain leaf row or a group row that stands in for a set
//! of child rows. Group rows carry the children that currently pass the
//! table filter, so totals can expand collapsed groups without going back to
//! the data source.

use crate::value::Value;
use alloc::vec::Vec;

/// Unique identifier for a row.
pub type RowId = u64;

/// What a row represents.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RowKind {
    /// An ordinary data row.
    #[default]
    Leaf,
    /// An aggregate row grouping other rows.
    Group {
        /// Whether the group is shown collapsed (children hidden).
        collapsed: bool,
        /// The group's children that pass the current filter.
        children: Vec<Row>,
    },
}

/// A row of a live table.
#[derive(Clone, Debug)]
pub struct Row {
    /// Stable identifier for this row.
    id: RowId,
    /// Version number for change detection. Incremented on each update.
    version: u64,
    /// Cell values, indexed by column position.
    values: Vec<Value>,
    kind: RowKind,
}

impl Row {
    /// Creates a new leaf row with the given ID and values.
    /// Version defaults to 1 for new rows.
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self {
            id,
            version: 1,
            values,
            kind: RowKind::Leaf,
        }
    }

    /// Creates a new leaf row with the given ID, version, and values.
    pub fn new_with_version(id: RowId, version: u64, values: Vec<Value>) -> Self {
        Self {
            id,
            version,
            values,
            kind: RowKind::Leaf,
        }
    }

    /// Creates a group row over `children`.
    pub fn group(id: RowId, values: Vec<Value>, collapsed: bool, children: Vec<Row>) -> Self {
        Self {
            id,
            version: 1,
            values,
            kind: RowKind::Group { collapsed, children },
        }
    }

    /// Returns the row ID.
    #[inline]
    pub fn id(&self) -> RowId {
        self.id
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Increments the version number and returns the new value.
    #[inline]
    pub fn increment_version(&mut self) -> u64 {
        self.version = self.version.wrapping_add(1);
        self.version
    }

    /// Returns what this row represents.
    #[inline]
    pub fn kind(&self) -> &RowKind {
        &self.kind
    }

    /// Returns true for every group row, collapsed or not.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, RowKind::Group { .. })
    }

    /// Returns true for a group row shown collapsed.
    #[inline]
    pub fn is_collapsed(&self) -> bool {
        matches!(self.kind, RowKind::Group { collapsed: true, .. })
    }

    /// Returns the filtered children of a group row, or an empty slice.
    pub fn filtered_children(&self) -> &[Row] {
        match &self.kind {
            RowKind::Group { children, .. } => children,
            RowKind::Leaf => &[],
        }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index and bumps the version.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            self.increment_version();
            true
        } else {
            false
        }
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.values == other.values && self.kind == other.kind
    }
}
