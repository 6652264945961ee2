//! Totals entities: the two summary rows kept by the coordinator.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;
use tally_core::{Row, RowId, Value};

/// Identity of a totals entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TotalsKey {
    /// Summary over every row.
    All,
    /// Summary over the rows passing the current filter.
    Filtered,
}

impl TotalsKey {
    /// Returns the key's stable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TotalsKey::All => "all",
            TotalsKey::Filtered => "filtered",
        }
    }
}

impl fmt::Display for TotalsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pulls the current rows from the upstream source.
pub type RowSupplier = Rc<dyn Fn() -> Vec<Row>>;

/// Opaque row predicate.
pub type RowPredicate = Rc<dyn Fn(&Row) -> bool>;

/// A summary row owned by the totals coordinator.
///
/// The coordinator replaces the aggregate set on every upstream emission and
/// hands out clones as snapshots, so implementations should be cheap to
/// clone.
pub trait TotalsEntity: Clone + 'static {
    /// Returns which summary this is.
    fn key(&self) -> TotalsKey;

    /// Returns the rows contributing to the summary.
    fn rows(&self) -> &[Row];

    /// Replaces the rows contributing to the summary.
    fn set_rows(&mut self, rows: Vec<Row>);

    /// Installs or removes the pull accessor used to read fresh row values.
    fn set_row_supplier(&mut self, supplier: Option<RowSupplier>);

    /// Returns the base filter, if any.
    fn base_filter(&self) -> Option<&RowPredicate>;

    /// Sets or clears the base filter.
    fn set_base_filter(&mut self, filter: Option<RowPredicate>);
}

/// Column-wise totals over a set of rows.
///
/// Rows are stored as the snapshots last emitted upstream. Reads go through
/// the row supplier when one is installed, so metric updates made to a row
/// after the batch was emitted show up in the totals.
#[derive(Clone)]
pub struct Totals {
    key: TotalsKey,
    rows: Vec<Row>,
    base_filter: Option<RowPredicate>,
    supplier: Option<RowSupplier>,
}

impl Totals {
    /// Creates an empty summary for `key`.
    pub fn new(key: TotalsKey) -> Self {
        Self {
            key,
            rows: Vec::new(),
            base_filter: None,
            supplier: None,
        }
    }

    /// Creates the empty "all rows" summary.
    pub fn all() -> Self {
        Self::new(TotalsKey::All)
    }

    /// Creates the empty "filtered rows" summary.
    pub fn filtered() -> Self {
        Self::new(TotalsKey::Filtered)
    }

    /// Returns true once a row supplier has been installed.
    pub fn has_supplier(&self) -> bool {
        self.supplier.is_some()
    }

    /// Returns the contributing rows with their latest values, base filter
    /// applied.
    ///
    /// A row the supplier no longer knows keeps its emitted snapshot.
    pub fn current_rows(&self) -> Vec<Row> {
        let latest: Option<HashMap<RowId, Row>> = self
            .supplier
            .as_ref()
            .map(|supplier| supplier().into_iter().map(|row| (row.id(), row)).collect());

        self.rows
            .iter()
            .map(|row| {
                latest
                    .as_ref()
                    .and_then(|rows| rows.get(&row.id()))
                    .cloned()
                    .unwrap_or_else(|| row.clone())
            })
            .filter(|row| self.base_filter.as_ref().map_or(true, |keep| keep(row)))
            .collect()
    }

    /// Returns the number of rows counted by the totals.
    pub fn row_count(&self) -> usize {
        self.current_rows().len()
    }

    /// Sums every column over `current_rows`.
    ///
    /// Numeric columns sum; a column holding anything else totals to `Null`.
    /// The result is as wide as the widest row.
    pub fn column_totals(&self) -> Vec<Value> {
        let rows = self.current_rows();
        let width = rows.iter().map(Row::len).max().unwrap_or(0);
        let mut totals = alloc::vec![Value::Null; width];
        let mut poisoned = alloc::vec![false; width];

        for row in &rows {
            for (column, value) in row.values().iter().enumerate() {
                if poisoned[column] || value.is_null() {
                    continue;
                }
                if !value.is_numeric() {
                    poisoned[column] = true;
                    totals[column] = Value::Null;
                    continue;
                }
                totals[column] = totals[column].accumulate(value);
            }
        }
        totals
    }
}

impl TotalsEntity for Totals {
    fn key(&self) -> TotalsKey {
        self.key
    }

    fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn set_rows(&mut self, rows: Vec<Row>) {
        self.rows = rows;
    }

    fn set_row_supplier(&mut self, supplier: Option<RowSupplier>) {
        self.supplier = supplier;
    }

    fn base_filter(&self) -> Option<&RowPredicate> {
        self.base_filter.as_ref()
    }

    fn set_base_filter(&mut self, filter: Option<RowPredicate>) {
        self.base_filter = filter;
    }
}

impl fmt::Debug for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Totals")
            .field("key", &self.key)
            .field("rows", &self.rows.len())
            .field("base_filter", &self.base_filter.is_some())
            .field("supplier", &self.supplier.is_some())
            .finish()
    }
}
