//! Cell values and the narrow grid interface the engine works against.

use serde_json::Value;
use std::collections::BTreeMap;

/// Represents a cell value with type information
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(String),
}

impl CellValue {
    /// A cell counts as blank when it is absent or holds the empty string.
    /// Whitespace-only text is not blank.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Canonical string form used for lookups and header names.
    ///
    /// Integral numbers drop the fractional part, so `42.0` and the text
    /// `"42"` compare equal.
    pub fn canonical_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(true) => "TRUE".to_string(),
            CellValue::Boolean(false) => "FALSE".to_string(),
            CellValue::DateTime(dt) => dt.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::String(s) | CellValue::DateTime(s) => Value::String(s.clone()),
            CellValue::Number(n) => number_to_json(*n),
            CellValue::Boolean(b) => Value::Bool(*b),
        }
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::String(n.to_string())),
            Value::String(s) => CellValue::String(s.clone()),
            // Nested structures have no cell representation; store their JSON text
            other => CellValue::String(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INT
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Integral floats come back as JSON integers
pub fn number_to_json(n: f64) -> Value {
    if is_integral(n) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Narrow view of a worksheet: 1-based cell access plus row deletion.
///
/// `max_row` / `max_column` report the highest populated position the
/// backing store knows about, which may include cells that were cleared.
pub trait Grid {
    fn cell(&self, row: u32, col: u32) -> CellValue;
    fn set_cell(&mut self, row: u32, col: u32, value: &CellValue);
    fn max_row(&self) -> u32;
    fn max_column(&self) -> u32;
    /// Remove `count` rows starting at `start`, shifting later rows up
    fn delete_rows(&mut self, start: u32, count: u32);
}

/// In-memory grid. Cleared cells stay allocated, the same way a workbook
/// keeps them, so compaction has real work to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySheet {
    cells: BTreeMap<(u32, u32), CellValue>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sheet from rows of values, starting at row 1
    pub fn from_rows<R, V>(rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<V>>,
        V: Into<CellValue>,
    {
        let mut sheet = MemorySheet::new();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                sheet.set_cell(r as u32 + 1, c as u32 + 1, &value.into());
            }
        }
        sheet
    }

    /// Row contents from column 1 through `max_column`
    pub fn row_values(&self, row: u32) -> Vec<CellValue> {
        (1..=self.max_column()).map(|c| self.cell(row, c)).collect()
    }
}

impl Grid for MemorySheet {
    fn cell(&self, row: u32, col: u32) -> CellValue {
        self.cells.get(&(row, col)).cloned().unwrap_or_default()
    }

    fn set_cell(&mut self, row: u32, col: u32, value: &CellValue) {
        self.cells.insert((row, col), value.clone());
    }

    fn max_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| *r).max().unwrap_or(0)
    }

    fn max_column(&self) -> u32 {
        self.cells.keys().map(|(_, c)| *c).max().unwrap_or(0)
    }

    fn delete_rows(&mut self, start: u32, count: u32) {
        if count == 0 {
            return;
        }
        let end = start.saturating_add(count);
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter(|((r, _), _)| *r < start || *r >= end)
            .map(|((r, c), v)| if r >= end { ((r - count, c), v) } else { ((r, c), v) })
            .collect();
    }
}
