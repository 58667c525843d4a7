//! Row mutations over a [`Grid`].
//!
//! These functions assume the caller already holds the file lock and will
//! save the workbook afterwards. Row 1 is the header row and is never
//! touched by positional updates or deletes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::compaction::{compact_all, compact_trailing, real_last_row};
use crate::config::EmptySheetAppend;
use crate::error::{Result, RowStoreError};
use crate::grid::{CellValue, Grid};
use crate::headers::HeaderIndex;
use crate::lookup::{find_all_rows, find_first_row};

/// Last column of an xlsx worksheet (XFD)
pub const MAX_COLUMN: u32 = 16_384;

/// Which rows a field update or delete applies to
#[derive(Debug, Clone, PartialEq)]
pub enum RowTarget {
    Row(u32),
    Lookup {
        column: String,
        value: CellValue,
        process_all: bool,
    },
}

impl RowTarget {
    /// Build a target from the optional request fields. A row wins over a
    /// lookup; a lookup needs both a column and a non-empty value.
    pub fn from_parts(
        row: Option<u32>,
        lookup_column: Option<&str>,
        lookup_value: Option<&Value>,
        process_all: bool,
    ) -> Result<Self> {
        if let Some(row) = row {
            return Ok(RowTarget::Row(row));
        }

        match (lookup_column, lookup_value) {
            (Some(column), Some(value)) if !column.is_empty() => {
                let value = CellValue::from(value);
                if value.is_blank() {
                    return Err(RowStoreError::MissingField("lookup_value".to_string()));
                }
                Ok(RowTarget::Lookup {
                    column: column.to_string(),
                    value,
                    process_all,
                })
            }
            _ => Err(RowStoreError::MissingField(
                "Must provide either 'row' or both 'lookup_column' and 'lookup_value'".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// Every lookup match
    All,
    /// Lowest-numbered lookup match only
    First,
    /// A single explicit row number
    Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAppend {
    pub row_number: u32,
    pub matched_columns: Vec<String>,
    pub ignored_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub rows_updated: Vec<u32>,
    pub updated_count: usize,
    pub updated_columns: Vec<String>,
    pub process_mode: ProcessMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub rows_deleted: Vec<u32>,
    pub deleted_count: usize,
    pub process_mode: ProcessMode,
}

/// Reject the header row, then anything outside `2..=max_row`
pub fn check_data_row<G: Grid + ?Sized>(grid: &G, row: u32) -> Result<()> {
    if row == 1 {
        return Err(RowStoreError::HeaderRowProtected);
    }
    let max_row = grid.max_row();
    if row < 1 || row > max_row {
        return Err(RowStoreError::InvalidRow { row, max_row });
    }
    Ok(())
}

fn write_values<G: Grid + ?Sized>(grid: &mut G, row: u32, start_column: u32, values: &[CellValue]) {
    for (offset, value) in values.iter().enumerate() {
        grid.set_cell(row, start_column + offset as u32, value);
    }
}

/// Reject writes that would start before column A or run past the last
/// worksheet column
fn check_columns(start_column: u32, count: usize) -> Result<()> {
    if !(1..=MAX_COLUMN).contains(&start_column) {
        return Err(RowStoreError::InvalidArgument(format!(
            "column_start must be between 1 and {}, got {}",
            MAX_COLUMN, start_column
        )));
    }
    let last_column = u32::try_from(count.saturating_sub(1))
        .ok()
        .and_then(|extra| start_column.checked_add(extra))
        .filter(|last| *last <= MAX_COLUMN);
    if last_column.is_none() {
        return Err(RowStoreError::InvalidArgument(format!(
            "{} values starting at column {} exceed the {}-column limit",
            count, start_column, MAX_COLUMN
        )));
    }
    Ok(())
}

/// Next free row after compaction, honoring the empty-sheet policy
fn next_append_row<G: Grid + ?Sized>(grid: &G, policy: EmptySheetAppend) -> Result<u32> {
    let last_row = real_last_row(grid);
    if last_row == 0 && policy == EmptySheetAppend::RequireHeaders {
        return Err(RowStoreError::NoHeaders);
    }
    Ok(last_row + 1)
}

/// Append `values` after the last non-blank row. Returns the row written.
pub fn append_values<G: Grid + ?Sized>(
    grid: &mut G,
    values: &[CellValue],
    start_column: u32,
    policy: EmptySheetAppend,
) -> Result<u32> {
    check_columns(start_column, values.len())?;
    compact_all(grid);
    let row = next_append_row(grid, policy)?;
    write_values(grid, row, start_column, values);
    Ok(row)
}

/// Append a row addressed by header names. Every header column gets the
/// supplied value or an empty cell; unknown names are reported, not fatal.
pub fn append_fields<G: Grid + ?Sized>(grid: &mut G, fields: &Map<String, Value>) -> Result<FieldAppend> {
    compact_all(grid);
    let headers = HeaderIndex::resolve_strict(grid)?;

    let (matched_columns, ignored_columns): (Vec<String>, Vec<String>) =
        fields.keys().cloned().partition(|name| headers.contains(name));
    if !ignored_columns.is_empty() {
        tracing::warn!(columns = ?ignored_columns, "Unknown columns will be ignored");
    }

    let row = real_last_row(grid) + 1;
    for (name, col) in headers.iter() {
        let value = fields.get(name).map(CellValue::from).unwrap_or_default();
        grid.set_cell(row, col, &value);
    }

    Ok(FieldAppend {
        row_number: row,
        matched_columns,
        ignored_columns,
    })
}

/// Overwrite `values` into `row` starting at `start_column`
pub fn update_row<G: Grid + ?Sized>(
    grid: &mut G,
    row: u32,
    values: &[CellValue],
    start_column: u32,
) -> Result<()> {
    check_columns(start_column, values.len())?;
    check_data_row(grid, row)?;
    write_values(grid, row, start_column, values);
    compact_all(grid);
    Ok(())
}

/// Remove a single data row
pub fn delete_row<G: Grid + ?Sized>(grid: &mut G, row: u32) -> Result<()> {
    check_data_row(grid, row)?;
    grid.delete_rows(row, 1);
    compact_all(grid);
    Ok(())
}

fn lookup_targets<G: Grid + ?Sized>(
    grid: &G,
    column: &str,
    value: &CellValue,
    process_all: bool,
) -> Result<(Vec<u32>, ProcessMode)> {
    let headers = HeaderIndex::resolve_strict(grid).map_err(|e| match e {
        RowStoreError::NoHeaders => RowStoreError::BadLookupColumn {
            column: column.to_string(),
            available: Vec::new(),
        },
        other => other,
    })?;

    let (rows, mode) = if process_all {
        (find_all_rows(grid, &headers, column, value)?, ProcessMode::All)
    } else {
        let first = find_first_row(grid, &headers, column, value)?;
        (first.into_iter().collect(), ProcessMode::First)
    };

    if rows.is_empty() {
        return Err(RowStoreError::NoMatch {
            column: column.to_string(),
            value: value.canonical_string(),
        });
    }
    Ok((rows, mode))
}

/// Set named fields on the targeted rows. Field names missing from the
/// header row are skipped; the outcome lists the names actually applied.
pub fn update_fields<G: Grid + ?Sized>(
    grid: &mut G,
    target: &RowTarget,
    fields: &Map<String, Value>,
) -> Result<UpdateOutcome> {
    let (rows, process_mode) = match target {
        RowTarget::Row(row) => {
            check_data_row(grid, *row)?;
            (vec![*row], ProcessMode::Row)
        }
        RowTarget::Lookup {
            column,
            value,
            process_all,
        } => lookup_targets(grid, column, value, *process_all)?,
    };

    let headers = HeaderIndex::resolve(grid);
    headers.ensure_unique()?;

    let mut applied: Vec<(String, u32, CellValue)> = Vec::new();
    for (name, value) in fields {
        match headers.column(name) {
            Some(col) => applied.push((name.clone(), col, CellValue::from(value))),
            None => tracing::warn!(column = %name, "Column not found in headers, skipping"),
        }
    }

    for row in &rows {
        for (name, col, value) in &applied {
            grid.set_cell(*row, *col, value);
            tracing::debug!(row, column = %name, "Updated cell");
        }
    }

    compact_all(grid);

    Ok(UpdateOutcome {
        updated_count: rows.len(),
        rows_updated: rows,
        updated_columns: applied.into_iter().map(|(name, _, _)| name).collect(),
        process_mode,
    })
}

/// Delete the targeted rows. Multiple matches are removed from the highest
/// position down so earlier positions stay valid.
pub fn delete_rows<G: Grid + ?Sized>(grid: &mut G, target: &RowTarget) -> Result<DeleteOutcome> {
    let (mut rows, process_mode) = match target {
        RowTarget::Row(row) => {
            check_data_row(grid, *row)?;
            (vec![*row], ProcessMode::Row)
        }
        RowTarget::Lookup {
            column,
            value,
            process_all,
        } => lookup_targets(grid, column, value, *process_all)?,
    };

    rows.sort_unstable_by(|a, b| b.cmp(a));
    for row in &rows {
        grid.delete_rows(*row, 1);
        tracing::info!(row, "Deleted row");
    }

    compact_all(grid);

    Ok(DeleteOutcome {
        deleted_count: rows.len(),
        rows_deleted: rows,
        process_mode,
    })
}

/// One entry of a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub row: Option<u32>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
    #[serde(default)]
    pub column_start: Option<u32>,
}

/// Per-operation outcome; failures are captured here instead of aborting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub operation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    fn failed(operation: &str, error: &RowStoreError) -> Self {
        BatchResult {
            operation: operation.to_string(),
            success: false,
            row_number: None,
            row: None,
            error: Some(error.to_string()),
        }
    }
}

fn batch_values(op: &BatchOperation) -> Result<Vec<CellValue>> {
    op.values
        .as_ref()
        .map(|values| values.iter().map(CellValue::from).collect())
        .ok_or_else(|| RowStoreError::MissingField("values".to_string()))
}

fn batch_row(op: &BatchOperation) -> Result<u32> {
    op.row.ok_or_else(|| RowStoreError::MissingField("row".to_string()))
}

fn apply_one<G: Grid + ?Sized>(
    grid: &mut G,
    op: &BatchOperation,
    policy: EmptySheetAppend,
) -> Result<BatchResult> {
    let mut result = BatchResult {
        operation: op.kind.clone(),
        success: true,
        row_number: None,
        row: None,
        error: None,
    };

    match op.kind.as_str() {
        "append" => {
            let values = batch_values(op)?;
            let start_column = op.column_start.unwrap_or(1);
            check_columns(start_column, values.len())?;
            let row = next_append_row(grid, policy)?;
            write_values(grid, row, start_column, &values);
            result.row_number = Some(row);
        }
        "update" => {
            let row = batch_row(op)?;
            let values = batch_values(op)?;
            let start_column = op.column_start.unwrap_or(1);
            check_columns(start_column, values.len())?;
            check_data_row(grid, row)?;
            write_values(grid, row, start_column, &values);
            result.row = Some(row);
        }
        "delete" => {
            let row = batch_row(op)?;
            check_data_row(grid, row)?;
            grid.delete_rows(row, 1);
            result.row = Some(row);
        }
        other => {
            return Err(RowStoreError::InvalidArgument(format!(
                "Unsupported operation type '{}' (expected append, update or delete)",
                other
            )))
        }
    }

    Ok(result)
}

/// Apply `operations` in order against one sheet. Positions are evaluated
/// against the sheet as left by the previous operation.
pub fn apply_batch<G: Grid + ?Sized>(
    grid: &mut G,
    operations: &[BatchOperation],
    policy: EmptySheetAppend,
) -> Vec<BatchResult> {
    compact_all(grid);

    let results: Vec<BatchResult> = operations
        .iter()
        .map(|op| {
            apply_one(grid, op, policy).unwrap_or_else(|e| {
                tracing::warn!(operation = %op.kind, error = %e, "Batch operation failed");
                BatchResult::failed(&op.kind, &e)
            })
        })
        .collect();

    compact_trailing(grid);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemorySheet;
    use serde_json::json;

    fn staff() -> MemorySheet {
        MemorySheet::from_rows(vec![
            vec!["ID", "Name", "Department"],
            vec!["E1", "Ann", "Engineering"],
            vec!["E2", "Bob", "Sales"],
            vec!["E3", "Cy", "Engineering"],
            vec!["E4", "Di", "Engineering"],
            vec!["E5", "Ed", "Support"],
        ])
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn lookup(column: &str, value: &str, process_all: bool) -> RowTarget {
        RowTarget::Lookup {
            column: column.to_string(),
            value: value.into(),
            process_all,
        }
    }

    #[test]
    fn test_append_on_empty_sheet_writes_row_one() {
        let mut sheet = MemorySheet::new();
        let row = append_values(&mut sheet, &["A".into(), "B".into()], 1, EmptySheetAppend::FirstRow).unwrap();
        assert_eq!(row, 1);
        assert_eq!(sheet.cell(1, 2), CellValue::from("B"));
    }

    #[test]
    fn test_append_on_empty_sheet_can_require_headers() {
        let mut sheet = MemorySheet::new();
        let err = append_values(&mut sheet, &["A".into()], 1, EmptySheetAppend::RequireHeaders).unwrap_err();
        assert!(matches!(err, RowStoreError::NoHeaders));
        assert_eq!(sheet.max_row(), 0);
    }

    #[test]
    fn test_append_reclaims_blank_rows_first() {
        let mut sheet = staff();
        sheet.set_cell(3, 1, &CellValue::Empty);
        sheet.set_cell(3, 2, &CellValue::Empty);
        sheet.set_cell(3, 3, &CellValue::Empty);
        sheet.set_cell(9, 1, &CellValue::from(""));

        let row = append_values(&mut sheet, &["E6".into()], 1, EmptySheetAppend::FirstRow).unwrap();
        assert_eq!(row, 6);
        assert_eq!(sheet.cell(3, 1), CellValue::from("E3"));
    }

    #[test]
    fn test_append_with_start_column() {
        let mut sheet = staff();
        let row = append_values(&mut sheet, &["Zed".into()], 2, EmptySheetAppend::FirstRow).unwrap();
        assert_eq!(row, 7);
        assert_eq!(sheet.cell(7, 1), CellValue::Empty);
        assert_eq!(sheet.cell(7, 2), CellValue::from("Zed"));
    }

    #[test]
    fn test_start_column_outside_sheet_is_rejected() {
        let mut sheet = staff();
        let values: Vec<CellValue> = vec!["a".into(), "b".into()];

        for start in [0, MAX_COLUMN + 1, u32::MAX] {
            let err = append_values(&mut sheet, &values, start, EmptySheetAppend::FirstRow).unwrap_err();
            assert!(matches!(err, RowStoreError::InvalidArgument(_)), "start {}", start);
        }
        // two values from the last column would spill past it
        assert!(matches!(
            update_row(&mut sheet, 2, &values, MAX_COLUMN),
            Err(RowStoreError::InvalidArgument(_))
        ));
        assert_eq!(sheet.max_row(), 6);
        assert_eq!(sheet.max_column(), 3);
    }

    #[test]
    fn test_values_may_end_on_last_column() {
        let mut sheet = staff();
        let values: Vec<CellValue> = vec!["a".into(), "b".into()];

        let row = append_values(&mut sheet, &values, MAX_COLUMN - 1, EmptySheetAppend::FirstRow).unwrap();
        assert_eq!(row, 7);
        assert_eq!(sheet.cell(7, MAX_COLUMN), CellValue::from("b"));

        update_row(&mut sheet, 2, &values[..1], MAX_COLUMN).unwrap();
        assert_eq!(sheet.cell(2, MAX_COLUMN), CellValue::from("a"));
    }

    #[test]
    fn test_batch_column_overflow_fails_only_that_operation() {
        let mut sheet = staff();
        let mut wide = op("append", None, Some(json!(["x", "y"])));
        wide.column_start = Some(MAX_COLUMN);

        let results = apply_batch(
            &mut sheet,
            &[wide, op("append", None, Some(json!(["E6"])))],
            EmptySheetAppend::FirstRow,
        );
        assert!(!results[0].success);
        assert_eq!(results[1].row_number, Some(7));
    }

    #[test]
    fn test_append_fields_maps_by_header() {
        let mut sheet = staff();
        let outcome = append_fields(
            &mut sheet,
            &fields(json!({"Department": "Finance", "ID": "E6", "Nickname": "x"})),
        )
        .unwrap();

        assert_eq!(outcome.row_number, 7);
        assert_eq!(outcome.matched_columns, vec!["Department", "ID"]);
        assert_eq!(outcome.ignored_columns, vec!["Nickname"]);
        assert_eq!(
            sheet.row_values(7),
            vec![CellValue::from("E6"), CellValue::Empty, CellValue::from("Finance")]
        );
    }

    #[test]
    fn test_append_fields_requires_headers() {
        let mut sheet = MemorySheet::new();
        let err = append_fields(&mut sheet, &fields(json!({"ID": "E1"}))).unwrap_err();
        assert!(matches!(err, RowStoreError::NoHeaders));
    }

    #[test]
    fn test_header_row_is_protected() {
        let mut sheet = staff();
        let before = sheet.clone();

        assert!(matches!(
            update_row(&mut sheet, 1, &["X".into()], 1),
            Err(RowStoreError::HeaderRowProtected)
        ));
        assert!(matches!(delete_row(&mut sheet, 1), Err(RowStoreError::HeaderRowProtected)));
        assert!(matches!(
            update_fields(&mut sheet, &RowTarget::Row(1), &fields(json!({"ID": "X"}))),
            Err(RowStoreError::HeaderRowProtected)
        ));
        assert!(matches!(
            delete_rows(&mut sheet, &RowTarget::Row(1)),
            Err(RowStoreError::HeaderRowProtected)
        ));
        assert_eq!(sheet, before);
    }

    #[test]
    fn test_out_of_range_rows() {
        let mut sheet = staff();
        assert!(matches!(
            update_row(&mut sheet, 7, &["X".into()], 1),
            Err(RowStoreError::InvalidRow { row: 7, max_row: 6 })
        ));
        assert!(matches!(delete_row(&mut sheet, 0), Err(RowStoreError::InvalidRow { .. })));
    }

    #[test]
    fn test_update_row_positional() {
        let mut sheet = staff();
        update_row(&mut sheet, 3, &["Robert".into(), "Marketing".into()], 2).unwrap();
        assert_eq!(
            sheet.row_values(3),
            vec![CellValue::from("E2"), CellValue::from("Robert"), CellValue::from("Marketing")]
        );
    }

    #[test]
    fn test_update_row_blanking_a_row_compacts_it() {
        let mut sheet = staff();
        update_row(&mut sheet, 3, &[CellValue::Empty, CellValue::Empty, CellValue::Empty], 1).unwrap();
        assert_eq!(sheet.max_row(), 5);
        assert_eq!(sheet.cell(3, 1), CellValue::from("E3"));
    }

    #[test]
    fn test_update_by_lookup_all() {
        let mut sheet = staff();
        let outcome = update_fields(
            &mut sheet,
            &lookup("Department", "Engineering", true),
            &fields(json!({"Department": "R&D"})),
        )
        .unwrap();

        assert_eq!(outcome.process_mode, ProcessMode::All);
        assert_eq!(outcome.updated_count, 3);
        assert_eq!(outcome.rows_updated, vec![2, 4, 5]);
        for row in [2, 4, 5] {
            assert_eq!(sheet.cell(row, 3), CellValue::from("R&D"));
        }
        assert_eq!(sheet.cell(3, 3), CellValue::from("Sales"));
    }

    #[test]
    fn test_update_by_lookup_first_only() {
        let mut sheet = staff();
        let outcome = update_fields(
            &mut sheet,
            &lookup("Department", "Engineering", false),
            &fields(json!({"Name": "Updated"})),
        )
        .unwrap();

        assert_eq!(outcome.process_mode, ProcessMode::First);
        assert_eq!(outcome.updated_count, 1);
        assert_eq!(outcome.rows_updated, vec![2]);
        assert_eq!(sheet.cell(2, 2), CellValue::from("Updated"));
        assert_eq!(sheet.cell(4, 2), CellValue::from("Cy"));
    }

    #[test]
    fn test_update_skips_unknown_fields() {
        let mut sheet = staff();
        let outcome = update_fields(
            &mut sheet,
            &RowTarget::Row(2),
            &fields(json!({"Salary": 10, "Name": "Anne"})),
        )
        .unwrap();

        assert_eq!(outcome.process_mode, ProcessMode::Row);
        assert_eq!(outcome.updated_columns, vec!["Name"]);
        assert_eq!(sheet.cell(2, 2), CellValue::from("Anne"));
        assert_eq!(sheet.max_column(), 3);
    }

    #[test]
    fn test_update_no_match() {
        let mut sheet = staff();
        let err = update_fields(&mut sheet, &lookup("ID", "E9", true), &fields(json!({"Name": "x"})))
            .unwrap_err();
        assert!(matches!(err, RowStoreError::NoMatch { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_delete_by_lookup_descending_keeps_targets() {
        let mut sheet = staff();
        sheet.set_cell(7, 1, &CellValue::from("E6"));
        sheet.set_cell(7, 3, &CellValue::from("Ops"));

        let outcome = delete_rows(&mut sheet, &lookup("Department", "Engineering", true)).unwrap();
        assert_eq!(outcome.rows_deleted, vec![5, 4, 2]);
        assert_eq!(outcome.deleted_count, 3);
        assert_eq!(outcome.process_mode, ProcessMode::All);

        // Original row 6 (E5) and row 7 (E6) moved up to rows 3 and 4
        assert_eq!(sheet.cell(2, 1), CellValue::from("E2"));
        assert_eq!(sheet.cell(3, 1), CellValue::from("E5"));
        assert_eq!(sheet.cell(4, 1), CellValue::from("E6"));
        assert_eq!(sheet.max_row(), 4);
    }

    #[test]
    fn test_delete_by_lookup_first_only() {
        let mut sheet = staff();
        let outcome = delete_rows(&mut sheet, &lookup("Department", "Engineering", false)).unwrap();
        assert_eq!(outcome.rows_deleted, vec![2]);
        assert_eq!(outcome.process_mode, ProcessMode::First);
        assert_eq!(sheet.cell(2, 1), CellValue::from("E2"));
        assert_eq!(sheet.max_row(), 5);
    }

    #[test]
    fn test_lookup_rejects_duplicate_headers() {
        let mut sheet = MemorySheet::from_rows(vec![vec!["ID", "ID"], vec!["E1", "E1"]]);
        let err = delete_rows(&mut sheet, &lookup("ID", "E1", true)).unwrap_err();
        assert!(matches!(err, RowStoreError::DuplicateHeader { .. }));
        assert_eq!(sheet.max_row(), 2);
    }

    #[test]
    fn test_row_target_from_parts() {
        assert_eq!(
            RowTarget::from_parts(Some(3), Some("ID"), Some(&json!("E1")), true).unwrap(),
            RowTarget::Row(3)
        );
        assert_eq!(
            RowTarget::from_parts(None, Some("ID"), Some(&json!(7)), false).unwrap(),
            RowTarget::Lookup {
                column: "ID".to_string(),
                value: CellValue::Number(7.0),
                process_all: false
            }
        );
        assert!(matches!(
            RowTarget::from_parts(None, Some("ID"), Some(&json!("")), true),
            Err(RowStoreError::MissingField(_))
        ));
        assert!(matches!(
            RowTarget::from_parts(None, None, None, true),
            Err(RowStoreError::MissingField(_))
        ));
    }

    fn op(kind: &str, row: Option<u32>, values: Option<Value>) -> BatchOperation {
        BatchOperation {
            kind: kind.to_string(),
            row,
            values: values.map(|v| v.as_array().cloned().unwrap()),
            column_start: None,
        }
    }

    #[test]
    fn test_batch_captures_failures_independently() {
        let mut sheet = staff();
        let results = apply_batch(
            &mut sheet,
            &[
                op("append", None, Some(json!(["E6", "Fay", "Ops"]))),
                op("update", Some(1), Some(json!(["nope"]))),
                op("update", Some(2), Some(json!(["E1x"]))),
                op("delete", Some(3), None),
                op("upsert", Some(2), None),
                op("delete", None, None),
                op("append", None, Some(json!(["E7"]))),
            ],
            EmptySheetAppend::FirstRow,
        );

        assert_eq!(results.len(), 7);
        assert_eq!(results[0].row_number, Some(7));
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("header row"));
        assert!(results[2].success);
        assert_eq!(results[3].row, Some(3));
        assert!(!results[4].success);
        assert!(!results[5].success);
        // the delete shifted rows up, so the second append lands on row 7 again
        assert_eq!(results[6].row_number, Some(7));

        assert_eq!(sheet.cell(2, 1), CellValue::from("E1x"));
        assert_eq!(sheet.cell(3, 1), CellValue::from("E3"));
        assert_eq!(sheet.cell(7, 1), CellValue::from("E7"));
    }
}
