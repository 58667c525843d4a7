use std::path::{Path, PathBuf};
use umya_spreadsheet::{self, reader, writer, CellRawValue, Spreadsheet, Worksheet};

use super::reader::format_excel_datetime;
use crate::error::{Result, RowStoreError};
use crate::grid::{CellValue, Grid};

/// True when a number format code renders a date or time. Quoted literals,
/// bracketed sections like `[Red]` and escaped characters are ignored.
fn is_date_format(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for ch in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '\\' => escaped = true,
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ if in_brackets => {}
            'd' | 'D' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' | 'm' | 'M' => return true,
            _ => {}
        }
    }
    false
}

fn date_text(cell: &umya_spreadsheet::Cell, serial: f64) -> Option<String> {
    let format = cell.get_style().get_number_format()?;
    if is_date_format(format.get_format_code()) {
        format_excel_datetime(serial)
    } else {
        None
    }
}

/// Convert an umya cell to our CellValue
fn convert_cell(cell: &umya_spreadsheet::Cell) -> CellValue {
    match cell.get_raw_value() {
        CellRawValue::Numeric(n) => match date_text(cell, *n) {
            Some(text) => CellValue::DateTime(text),
            None => CellValue::Number(*n),
        },
        CellRawValue::Bool(b) => CellValue::Boolean(*b),
        CellRawValue::Null => CellValue::Empty,
        _ => {
            let text = cell.get_value();
            if text.is_empty() {
                CellValue::Empty
            } else {
                CellValue::String(text.to_string())
            }
        }
    }
}

// umya addresses cells as (col, row)
impl Grid for Worksheet {
    fn cell(&self, row: u32, col: u32) -> CellValue {
        self.get_cell((col, row))
            .map(convert_cell)
            .unwrap_or(CellValue::Empty)
    }

    fn set_cell(&mut self, row: u32, col: u32, value: &CellValue) {
        let cell = self.get_cell_mut((col, row));

        match value {
            CellValue::Empty => {
                cell.set_value_string("");
            }
            CellValue::String(s) | CellValue::DateTime(s) => {
                // Keep text as text; set_value would guess "42" into a number
                cell.set_value_string(s.clone());
            }
            CellValue::Number(n) => {
                cell.set_value_number(*n);
            }
            CellValue::Boolean(b) => {
                cell.set_value_bool(*b);
            }
        }
    }

    fn max_row(&self) -> u32 {
        self.get_highest_row()
    }

    fn max_column(&self) -> u32 {
        self.get_highest_column()
    }

    fn delete_rows(&mut self, start: u32, count: u32) {
        if count > 0 {
            self.remove_row(&start, &count);
        }
    }
}

/// A workbook loaded fresh from disk for the duration of one operation
pub struct WorkbookFile {
    path: PathBuf,
    book: Spreadsheet,
}

impl WorkbookFile {
    /// Open an existing workbook
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RowStoreError::FileNotFound(display_name(path)));
        }

        let book = reader::xlsx::read(path)
            .map_err(|e| RowStoreError::Read(format!("Failed to open workbook: {}", e)))?;

        Ok(WorkbookFile {
            path: path.to_path_buf(),
            book,
        })
    }

    /// Open the workbook, or start a new one holding just `sheet`. A new
    /// workbook only reaches disk on [`WorkbookFile::save`].
    pub fn open_or_create(path: &Path, sheet: &str) -> Result<Self> {
        if path.exists() {
            return Self::open(path);
        }

        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        book.new_sheet(sheet)
            .map_err(|e| RowStoreError::Write(format!("Failed to create sheet '{}': {}", sheet, e)))?;
        tracing::info!(path = %path.display(), sheet = %sheet, "Created new workbook");

        Ok(WorkbookFile {
            path: path.to_path_buf(),
            book,
        })
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Worksheet> {
        self.book
            .get_sheet_by_name_mut(name)
            .ok_or_else(|| RowStoreError::SheetNotFound(name.to_string()))
    }

    /// Get the sheet, adding an empty one when missing
    pub fn sheet_or_create(&mut self, name: &str) -> Result<&mut Worksheet> {
        if self.book.get_sheet_by_name(name).is_none() {
            self.book
                .new_sheet(name)
                .map_err(|e| RowStoreError::Write(format!("Failed to create sheet '{}': {}", name, e)))?;
            tracing::info!(path = %self.path.display(), sheet = %name, "Created new sheet");
        }
        self.sheet_mut(name)
    }

    /// Write the whole workbook back to its path
    pub fn save(&self) -> Result<()> {
        writer::xlsx::write(&self.book, &self.path)
            .map_err(|e| RowStoreError::Write(format!("Failed to save workbook: {}", e)))?;
        tracing::info!(path = %self.path.display(), "Saved workbook");
        Ok(())
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
