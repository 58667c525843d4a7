//! Excel file access.
//!
//! This module provides:
//! - A mutable workbook handle (umya-spreadsheet) that implements [`Grid`](crate::grid::Grid)
//! - A read path (calamine) with A1 range limits and date formatting

pub mod reader;
pub mod workbook;

pub use reader::{get_sheets, read_rows, CellRange};
pub use workbook::WorkbookFile;
