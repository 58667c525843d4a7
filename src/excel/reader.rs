use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::workbook::display_name;
use crate::error::{Result, RowStoreError};
use crate::grid::CellValue;

/// Rectangular A1-style range, 1-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl FromStr for CellRange {
    type Err = RowStoreError;

    /// Accepts "A1:C5" or a single cell "B2"
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (start, end) = match s.split_once(':') {
            Some((a, b)) => (a, b),
            None => (s, s),
        };
        let (r1, c1) = parse_cell_ref(start).ok_or_else(|| RowStoreError::InvalidRange(s.to_string()))?;
        let (r2, c2) = parse_cell_ref(end).ok_or_else(|| RowStoreError::InvalidRange(s.to_string()))?;

        Ok(CellRange {
            first_row: r1.min(r2),
            first_col: c1.min(c2),
            last_row: r1.max(r2),
            last_col: c1.max(c2),
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_index_to_letter(self.first_col - 1),
            self.first_row,
            column_index_to_letter(self.last_col - 1),
            self.last_row
        )
    }
}

/// "B12" -> (12, 2)
fn parse_cell_ref(cell: &str) -> Option<(u32, u32)> {
    let cell = cell.trim().replace('$', "");
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);
    let col = column_letter_to_index(letters)? + 1;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Convert column letters (A, B, ..., Z, AA, ...) to a 0-based index
fn column_letter_to_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(n - 1)
}

/// Convert column index (0-based) to Excel column letter (A, B, ..., Z, AA, AB, ...)
fn column_index_to_letter(index: u32) -> String {
    let mut result = String::new();
    let mut n = index + 1;

    while n > 0 {
        n -= 1;
        let c = (b'A' + (n % 26) as u8) as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}

fn open(path: &Path) -> Result<Sheets<std::io::BufReader<std::fs::File>>> {
    if !path.exists() {
        return Err(RowStoreError::FileNotFound(display_name(path)));
    }
    open_workbook_auto(path).map_err(|e| RowStoreError::Read(format!("Failed to open workbook: {}", e)))
}

/// Sheet names in workbook order
pub fn get_sheets(path: &Path) -> Result<Vec<String>> {
    let workbook = open(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read the non-blank rows of a sheet, optionally limited to `range`.
///
/// Without a range, rows start at row 1 and columns at column A, so every
/// returned row has the same width.
pub fn read_rows(path: &Path, sheet: &str, range: Option<&CellRange>) -> Result<Vec<Vec<Value>>> {
    let mut workbook = open(path)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(RowStoreError::SheetNotFound(sheet.to_string()));
    }

    let data = workbook
        .worksheet_range(sheet)
        .map_err(|e| RowStoreError::Read(format!("Failed to read sheet '{}': {}", sheet, e)))?;

    Ok(collect_rows(&data, range))
}

fn collect_rows(data: &Range<Data>, range: Option<&CellRange>) -> Vec<Vec<Value>> {
    let (end_row, end_col) = match data.end() {
        Some(end) => end,
        None => return Vec::new(),
    };

    // calamine positions are 0-based
    let (first_row, first_col, last_row, last_col) = match range {
        Some(r) => (
            r.first_row - 1,
            r.first_col - 1,
            (r.last_row - 1).min(end_row),
            r.last_col - 1,
        ),
        None => (0, 0, end_row, end_col),
    };

    let mut rows = Vec::new();
    if first_row > last_row {
        return rows;
    }

    for row in first_row..=last_row {
        let values: Vec<CellValue> = (first_col..=last_col)
            .map(|col| convert_cell_value(data.get_value((row, col))))
            .collect();

        if values.iter().any(|v| !v.is_blank()) {
            rows.push(values.iter().map(CellValue::to_json).collect());
        }
    }

    rows
}

/// Convert calamine Data to our CellValue
fn convert_cell_value(cell: Option<&Data>) -> CellValue {
    match cell {
        None => CellValue::Empty,
        Some(data) => match data {
            Data::Empty => CellValue::Empty,
            // Cleared cells are stored as empty strings
            Data::String(s) if s.is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => {
                let f = dt.as_f64();
                CellValue::DateTime(format_excel_datetime(f).unwrap_or_else(|| f.to_string()))
            }
            Data::DateTimeIso(s) => CellValue::DateTime(s.clone()),
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::String(format!("#{:?}", e)),
        },
    }
}

/// Format an Excel serial datetime (days since 1899-12-30). Whole days render
/// as a date, anything with a time part as date and time.
pub(crate) fn format_excel_datetime(value: f64) -> Option<String> {
    let days = value.floor() as i64;
    let total_seconds = (value.fract() * 86400.0).round() as u32;

    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(days))?;

    if total_seconds == 0 {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let time = if total_seconds >= 86400 {
        chrono::NaiveTime::from_hms_opt(23, 59, 59)?
    } else {
        chrono::NaiveTime::from_num_seconds_from_midnight_opt(total_seconds, 0)?
    };
    let datetime = chrono::NaiveDateTime::new(date, time);

    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}
