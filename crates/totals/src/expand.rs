//! Expansion of grouped rows for totals.

use alloc::vec::Vec;
use tally_core::Row;

/// Flattens a filtered batch into the leaf rows totals are computed from.
///
/// Collapsed group rows are replaced in place by their filtered children
/// (nested collapsed groups included). Group rows that are still present
/// afterwards, i.e. expanded groups whose children are already listed in the
/// batch, are dropped. Leaf order is preserved.
pub fn expand_collapsed(rows: &[Row]) -> Vec<Row> {
    let mut leaves = Vec::with_capacity(rows.len());
    for row in rows {
        push_leaves(row, &mut leaves);
    }
    leaves
}

fn push_leaves(row: &Row, leaves: &mut Vec<Row>) {
    if row.is_collapsed() {
        for child in row.filtered_children() {
            push_leaves(child, leaves);
        }
    } else if !row.is_aggregate() {
        leaves.push(row.clone());
    }
}
