use crate::error::{Result, RowStoreError};
use crate::grid::{CellValue, Grid};
use crate::headers::HeaderIndex;

/// Every data row (2..=max row) whose `column` cell equals `value` after
/// canonical string conversion, in ascending order. An empty result is not
/// an error.
pub fn find_all_rows<G: Grid + ?Sized>(
    grid: &G,
    headers: &HeaderIndex,
    column: &str,
    value: &CellValue,
) -> Result<Vec<u32>> {
    let col = headers
        .column(column)
        .ok_or_else(|| RowStoreError::BadLookupColumn {
            column: column.to_string(),
            available: headers.names(),
        })?;

    let target = value.canonical_string();
    let mut matched = Vec::new();

    for row in 2..=grid.max_row() {
        if grid.cell(row, col).canonical_string() == target {
            tracing::debug!(row, column = %column, value = %target, "Found match");
            matched.push(row);
        }
    }

    Ok(matched)
}

/// Lowest matching data row
pub fn find_first_row<G: Grid + ?Sized>(
    grid: &G,
    headers: &HeaderIndex,
    column: &str,
    value: &CellValue,
) -> Result<Option<u32>> {
    Ok(find_all_rows(grid, headers, column, value)?.into_iter().next())
}
