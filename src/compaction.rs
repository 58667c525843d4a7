//! Blank row reclamation.
//!
//! Clearing cells does not shrink a worksheet's row count, so blank rows have
//! to be removed explicitly to keep "append at the next free row" correct and
//! row numbers dense.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionMode {
    /// Remove every blank row
    #[default]
    Full,
    /// Remove only blank rows after the last non-blank row
    Trailing,
}

/// True when every cell from column 1 to max column is absent or ""
pub fn is_blank_row<G: Grid + ?Sized>(grid: &G, row: u32) -> bool {
    (1..=grid.max_column()).all(|col| grid.cell(row, col).is_blank())
}

/// Last row holding any non-blank cell, or 0 for an empty sheet
pub fn real_last_row<G: Grid + ?Sized>(grid: &G) -> u32 {
    (1..=grid.max_row())
        .rev()
        .find(|row| !is_blank_row(grid, *row))
        .unwrap_or(0)
}

/// Delete every blank row, highest position first so earlier positions stay
/// valid. Returns the number of rows removed.
pub fn compact_all<G: Grid + ?Sized>(grid: &mut G) -> u32 {
    let blank_rows: Vec<u32> = (1..=grid.max_row())
        .rev()
        .filter(|row| is_blank_row(grid, *row))
        .collect();

    for row in &blank_rows {
        grid.delete_rows(*row, 1);
    }

    if !blank_rows.is_empty() {
        tracing::info!(count = blank_rows.len(), "Deleted empty rows");
    }
    blank_rows.len() as u32
}

/// Delete the blank tail in one call. Returns the number of rows removed.
pub fn compact_trailing<G: Grid + ?Sized>(grid: &mut G) -> u32 {
    let last_row = real_last_row(grid);
    let max_row = grid.max_row();
    if max_row <= last_row {
        return 0;
    }

    let count = max_row - last_row;
    grid.delete_rows(last_row + 1, count);
    tracing::debug!(count, "Deleted trailing empty rows");
    count
}

pub fn compact<G: Grid + ?Sized>(grid: &mut G, mode: CompactionMode) -> u32 {
    match mode {
        CompactionMode::Full => compact_all(grid),
        CompactionMode::Trailing => compact_trailing(grid),
    }
}
