use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the row store and its engine
#[derive(Debug, Error)]
pub enum RowStoreError {
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("No row found where {column} = {value}")]
    NoMatch { column: String, value: String },

    #[error("File is locked: {0}")]
    FileLocked(String),

    #[error("Cannot modify header row (row 1). Data rows start from row 2.")]
    HeaderRowProtected,

    #[error("Invalid row number: {row} (sheet has {max_row} rows)")]
    InvalidRow { row: u32, max_row: u32 },

    #[error("No headers found in row 1. Please ensure the first row contains column names.")]
    NoHeaders,

    #[error("Lookup column '{column}' not found in headers. Available columns: {available:?}")]
    BadLookupColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Duplicate header '{name}' in columns {first} and {second}")]
    DuplicateHeader { name: String, first: u32, second: u32 },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task join error: {0}")]
    Task(String),
}

/// Broad category of a [`RowStoreError`], used by the request layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Structural,
    Internal,
}

impl RowStoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RowStoreError::InvalidFileName(_)
            | RowStoreError::MissingField(_)
            | RowStoreError::InvalidArgument(_)
            | RowStoreError::InvalidRange(_) => ErrorClass::Validation,
            RowStoreError::FileNotFound(_)
            | RowStoreError::SheetNotFound(_)
            | RowStoreError::NoMatch { .. } => ErrorClass::NotFound,
            RowStoreError::FileLocked(_) => ErrorClass::Conflict,
            RowStoreError::HeaderRowProtected
            | RowStoreError::InvalidRow { .. }
            | RowStoreError::NoHeaders
            | RowStoreError::BadLookupColumn { .. }
            | RowStoreError::DuplicateHeader { .. } => ErrorClass::Structural,
            RowStoreError::Read(_)
            | RowStoreError::Write(_)
            | RowStoreError::Io(_)
            | RowStoreError::Config(_)
            | RowStoreError::Task(_) => ErrorClass::Internal,
        }
    }

    /// HTTP-style status code for this condition
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Validation | ErrorClass::Structural => 400,
            ErrorClass::NotFound => 404,
            ErrorClass::Conflict => 503,
            ErrorClass::Internal => 500,
        }
    }

    /// Stable machine-readable name of the condition
    pub fn kind(&self) -> &'static str {
        match self {
            RowStoreError::InvalidFileName(_) => "invalid_file_name",
            RowStoreError::MissingField(_) => "missing_field",
            RowStoreError::InvalidArgument(_) => "invalid_argument",
            RowStoreError::FileNotFound(_) => "file_not_found",
            RowStoreError::SheetNotFound(_) => "sheet_not_found",
            RowStoreError::NoMatch { .. } => "no_match",
            RowStoreError::FileLocked(_) => "file_locked",
            RowStoreError::HeaderRowProtected => "header_row_protected",
            RowStoreError::InvalidRow { .. } => "invalid_row",
            RowStoreError::NoHeaders => "no_headers",
            RowStoreError::BadLookupColumn { .. } => "bad_lookup_column",
            RowStoreError::DuplicateHeader { .. } => "duplicate_header",
            RowStoreError::InvalidRange(_) => "invalid_range",
            RowStoreError::Read(_) => "read_error",
            RowStoreError::Write(_) => "write_error",
            RowStoreError::Io(_) => "io_error",
            RowStoreError::Config(_) => "config_error",
            RowStoreError::Task(_) => "task_error",
        }
    }
}

pub type Result<T, E = RowStoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_lookup_column_lists_available() {
        let err = RowStoreError::BadLookupColumn {
            column: "Dept".to_string(),
            available: vec!["ID".to_string(), "Department".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'Dept'"));
        assert!(message.contains("\"ID\""));
        assert!(message.contains("\"Department\""));
        assert_eq!(err.class(), ErrorClass::Structural);
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RowStoreError::FileLocked("a.xlsx".into()).status_code(), 503);
        assert_eq!(RowStoreError::FileNotFound("a.xlsx".into()).status_code(), 404);
        assert_eq!(
            RowStoreError::NoMatch { column: "ID".into(), value: "E9".into() }.status_code(),
            404
        );
        assert_eq!(RowStoreError::InvalidFileName("../x".into()).status_code(), 400);
        assert_eq!(RowStoreError::Write("disk full".into()).status_code(), 500);
    }
}
