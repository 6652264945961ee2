//! Upstream row sources.
//!
//! `RowSource` is the contract the coordinator consumes. `MemoryRowSource`
//! implements it over an in-memory table, for tests and embedding hosts that
//! keep their rows in process.

use alloc::vec::Vec;
use core::cell::RefCell;
use hashbrown::HashMap;
use tally_core::{Result, Row, RowId};
use tally_reactive::Subject;

/// A live table the totals are computed from.
pub trait RowSource {
    /// Returns the current rows (pull, synchronous).
    fn rows(&self) -> Vec<Row>;

    /// Stream of filtered row batches. Batches may contain group rows.
    fn observe_filtered_rows(&self) -> Subject<Vec<Row>>;

    /// Stream of complete row batches.
    fn observe_all_rows(&self) -> Subject<Vec<Row>>;

    /// Stream of metric updates for one row.
    fn observe_row(&self, id: RowId) -> Subject<Row>;
}

#[derive(Default)]
struct MemoryTable {
    rows: Vec<Row>,
    row_streams: HashMap<RowId, Subject<Row>>,
}

/// In-memory `RowSource`.
///
/// Batch streams are hot: observers only see batches published after they
/// subscribe. Per-row streams replay the row's latest value, so subscribing
/// to a row delivers it synchronously.
pub struct MemoryRowSource {
    table: RefCell<MemoryTable>,
    all: Subject<Vec<Row>>,
    filtered: Subject<Vec<Row>>,
}

impl Default for MemoryRowSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRowSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self {
            table: RefCell::new(MemoryTable::default()),
            all: Subject::new(),
            filtered: Subject::new(),
        }
    }

    /// Creates a source holding `rows`. Nothing is published.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let source = Self::new();
        source.table.borrow_mut().rows = rows;
        source
    }

    /// Replaces the table without publishing.
    pub fn set_rows(&self, rows: Vec<Row>) {
        self.table.borrow_mut().rows = rows;
    }

    /// Replaces the table and publishes it as an "all rows" batch.
    pub fn publish_all(&self, rows: Vec<Row>) -> Result<()> {
        self.set_rows(rows.clone());
        self.all.emit(rows)
    }

    /// Publishes a filtered batch.
    pub fn publish_filtered(&self, rows: Vec<Row>) -> Result<()> {
        self.filtered.emit(rows)
    }

    /// Stores `row` (replacing the row with the same ID, or appending) and
    /// pushes it to that row's metric stream.
    pub fn update_row(&self, row: Row) -> Result<()> {
        let stream = {
            let mut table = self.table.borrow_mut();
            match table.rows.iter_mut().find(|r| r.id() == row.id()) {
                Some(slot) => *slot = row.clone(),
                None => table.rows.push(row.clone()),
            }
            table.row_streams.get(&row.id()).cloned()
        };
        match stream {
            Some(stream) => stream.emit(row),
            None => Ok(()),
        }
    }

    /// Returns the number of observers of a row's metric stream.
    pub fn row_observer_count(&self, id: RowId) -> usize {
        self.table
            .borrow()
            .row_streams
            .get(&id)
            .map(Subject::observer_count)
            .unwrap_or(0)
    }

    /// Returns the number of per-row metric streams currently kept.
    pub fn row_stream_count(&self) -> usize {
        self.table.borrow().row_streams.len()
    }

    /// Returns the number of metric observers across all rows.
    pub fn total_row_observers(&self) -> usize {
        self.table
            .borrow()
            .row_streams
            .values()
            .map(Subject::observer_count)
            .sum()
    }

    /// Returns the number of observers of the "all rows" stream.
    pub fn all_observer_count(&self) -> usize {
        self.all.observer_count()
    }

    /// Returns the number of observers of the filtered stream.
    pub fn filtered_observer_count(&self) -> usize {
        self.filtered.observer_count()
    }
}

impl RowSource for MemoryRowSource {
    fn rows(&self) -> Vec<Row> {
        self.table.borrow().rows.clone()
    }

    fn observe_filtered_rows(&self) -> Subject<Vec<Row>> {
        self.filtered.clone()
    }

    fn observe_all_rows(&self) -> Subject<Vec<Row>> {
        self.all.clone()
    }

    fn observe_row(&self, id: RowId) -> Subject<Row> {
        let mut table = self.table.borrow_mut();
        // Streams nobody observes anymore are dropped; they are re-seeded
        // from the table when asked for again.
        table
            .row_streams
            .retain(|&row_id, stream| row_id == id || stream.observer_count() > 0);
        if let Some(stream) = table.row_streams.get(&id) {
            return stream.clone();
        }

        let stream = match table.rows.iter().find(|r| r.id() == id) {
            Some(row) => Subject::replaying_with(row.clone()),
            None => Subject::replaying(),
        };
        table.row_streams.insert(id, stream.clone());
        stream
    }
}
