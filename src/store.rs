//! The row store service.
//!
//! One `RowStore` is built at startup and shared by every request handler.
//! Each operation follows the same path: validate the file name, take the
//! file's lock, load the workbook from disk, run the engine, compact, save,
//! and release the lock when the guard drops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use umya_spreadsheet::Worksheet;

use crate::compaction::{compact, CompactionMode};
use crate::config::StoreConfig;
use crate::error::{Result, RowStoreError};
use crate::excel::{self, CellRange, WorkbookFile};
use crate::grid::CellValue;
use crate::lock::{FileLockGuard, FileLockManager, LockStatus};
use crate::mutation::{self, BatchOperation, BatchResult, DeleteOutcome, FieldAppend, RowTarget, UpdateOutcome};

pub const SERVICE_NAME: &str = "Excel Row Store";

/// Whether an operation may create a missing workbook or sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Create,
    Existing,
}

/// Service health and lock overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub data_directory: String,
    pub lock_timeout: f64,
    pub locks: Vec<LockStatus>,
}

/// Reject names that could escape the data directory
pub fn validate_file_name(file: &str) -> Result<()> {
    if file.trim().is_empty() || file.contains("..") || file.contains('/') || file.contains('\\') {
        return Err(RowStoreError::InvalidFileName(file.to_string()));
    }
    Ok(())
}

pub struct RowStore {
    config: StoreConfig,
    locks: FileLockManager,
}

impl RowStore {
    /// Build the store, creating the data directory if needed
    pub fn new(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        tracing::info!(data_dir = %config.data_dir.display(), "Row store ready");
        let locks = FileLockManager::new(config.lock);
        Ok(RowStore { config, locks })
    }

    pub fn locks(&self) -> &FileLockManager {
        &self.locks
    }

    /// Path of `file` inside the data directory
    pub fn resolve_path(&self, file: &str) -> Result<PathBuf> {
        validate_file_name(file)?;
        Ok(self.config.data_dir.join(file))
    }

    fn lock(&self, file: &str, path: &Path, timeout: Duration) -> Result<FileLockGuard> {
        let key = path.to_string_lossy();
        self.locks
            .acquire_with_timeout(&key, timeout)
            .ok_or_else(|| RowStoreError::FileLocked(file.to_string()))
    }

    /// Run `f` against one sheet under the file lock, then save
    fn with_sheet<T, F>(&self, file: &str, sheet: &str, mode: OpenMode, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&mut Worksheet) -> Result<T>,
    {
        let path = self.resolve_path(file)?;
        if mode == OpenMode::Existing && !path.exists() {
            return Err(RowStoreError::FileNotFound(file.to_string()));
        }

        let _guard = self.lock(file, &path, timeout)?;

        let mut book = match mode {
            OpenMode::Create => WorkbookFile::open_or_create(&path, sheet)?,
            OpenMode::Existing => WorkbookFile::open(&path)?,
        };
        let worksheet = match mode {
            OpenMode::Create => book.sheet_or_create(sheet)?,
            OpenMode::Existing => book.sheet_mut(sheet)?,
        };

        let output = f(worksheet)?;
        book.save()?;
        Ok(output)
    }

    /// Append values starting at column 1. Returns the row written.
    pub fn append(&self, file: &str, sheet: &str, values: &[Value]) -> Result<u32> {
        self.append_at(file, sheet, values, 1)
    }

    /// Append values starting at `start_column`
    pub fn append_at(&self, file: &str, sheet: &str, values: &[Value], start_column: u32) -> Result<u32> {
        let values: Vec<CellValue> = values.iter().map(CellValue::from).collect();
        let policy = self.config.empty_sheet_append;
        self.with_sheet(file, sheet, OpenMode::Create, self.config.lock.timeout, |ws| {
            mutation::append_values(ws, &values, start_column, policy)
        })
    }

    /// Append a row addressed by header names
    pub fn append_fields(&self, file: &str, sheet: &str, fields: &Map<String, Value>) -> Result<FieldAppend> {
        self.with_sheet(file, sheet, OpenMode::Create, self.config.lock.timeout, |ws| {
            mutation::append_fields(ws, fields)
        })
    }

    /// Non-blank rows of a sheet, optionally limited to an A1 range
    pub fn read(&self, file: &str, sheet: &str, range: Option<&str>) -> Result<Vec<Vec<Value>>> {
        let range = range
            .filter(|r| !r.trim().is_empty())
            .map(str::parse::<CellRange>)
            .transpose()?;
        let path = self.resolve_path(file)?;
        if !path.exists() {
            return Err(RowStoreError::FileNotFound(file.to_string()));
        }

        let _guard = self.lock(file, &path, self.config.lock.timeout)?;
        excel::read_rows(&path, sheet, range.as_ref())
    }

    /// Overwrite a data row positionally
    pub fn update_row(&self, file: &str, sheet: &str, row: u32, values: &[Value], start_column: u32) -> Result<()> {
        let values: Vec<CellValue> = values.iter().map(CellValue::from).collect();
        self.with_sheet(file, sheet, OpenMode::Existing, self.config.lock.timeout, |ws| {
            mutation::update_row(ws, row, &values, start_column)
        })
    }

    /// Set named fields on a row or on lookup matches
    pub fn update_fields(
        &self,
        file: &str,
        sheet: &str,
        target: &RowTarget,
        fields: &Map<String, Value>,
    ) -> Result<UpdateOutcome> {
        self.with_sheet(file, sheet, OpenMode::Existing, self.config.lock.timeout, |ws| {
            mutation::update_fields(ws, target, fields)
        })
    }

    /// Remove one data row
    pub fn delete_row(&self, file: &str, sheet: &str, row: u32) -> Result<()> {
        self.with_sheet(file, sheet, OpenMode::Existing, self.config.lock.timeout, |ws| {
            mutation::delete_row(ws, row)
        })
    }

    /// Remove a row or lookup matches
    pub fn delete(&self, file: &str, sheet: &str, target: &RowTarget) -> Result<DeleteOutcome> {
        self.with_sheet(file, sheet, OpenMode::Existing, self.config.lock.timeout, |ws| {
            mutation::delete_rows(ws, target)
        })
    }

    /// Apply a batch under one lock acquisition with the batch timeout
    pub fn batch(&self, file: &str, sheet: &str, operations: &[BatchOperation]) -> Result<Vec<BatchResult>> {
        let policy = self.config.empty_sheet_append;
        self.with_sheet(file, sheet, OpenMode::Create, self.config.lock.batch_timeout, |ws| {
            Ok(mutation::apply_batch(ws, operations, policy))
        })
    }

    /// Explicitly reclaim blank rows. Returns the number removed.
    pub fn compact(&self, file: &str, sheet: &str, mode: CompactionMode) -> Result<u32> {
        self.with_sheet(file, sheet, OpenMode::Existing, self.config.lock.timeout, |ws| {
            Ok(compact(ws, mode))
        })
    }

    /// Spreadsheet files in the data directory, sorted by name
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let path = entry?.path();
            let is_sheet = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls"))
                .unwrap_or(false);
            if is_sheet && path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Sheet names of a workbook, read under its lock
    pub fn list_sheets(&self, file: &str) -> Result<Vec<String>> {
        let path = self.resolve_path(file)?;
        if !path.exists() {
            return Err(RowStoreError::FileNotFound(file.to_string()));
        }
        let _guard = self.lock(file, &path, self.config.lock.timeout)?;
        excel::get_sheets(&path)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            service: SERVICE_NAME.to_string(),
            status: "running".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            data_directory: self.config.data_dir.display().to_string(),
            lock_timeout: self.config.lock.timeout.as_secs_f64(),
            locks: self.locks.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use serde_json::json;

    fn test_store() -> (tempfile::TempDir, RowStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            lock: LockConfig {
                timeout: Duration::from_millis(200),
                batch_timeout: Duration::from_millis(400),
                poll_interval: Duration::from_millis(5),
            },
            ..StoreConfig::default()
        };
        let store = RowStore::new(config).unwrap();
        (dir, store)
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("data.xlsx").is_ok());
        for bad in ["../data.xlsx", "a/b.xlsx", "a\\b.xlsx", "", "  "] {
            assert!(matches!(
                validate_file_name(bad),
                Err(RowStoreError::InvalidFileName(_))
            ));
        }
    }

    #[test]
    fn test_invalid_name_rejected_before_locking() {
        let (_dir, store) = test_store();
        let err = store.append("../escape.xlsx", "Sheet1", &[json!("x")]).unwrap_err();
        assert!(matches!(err, RowStoreError::InvalidFileName(_)));
        assert!(store.locks().snapshot().is_empty());
    }

    #[test]
    fn test_locked_file_reports_conflict() {
        let (_dir, store) = test_store();
        store.append("busy.xlsx", "Sheet1", &[json!("ID")]).unwrap();

        let path = store.resolve_path("busy.xlsx").unwrap();
        let _held = store.locks().acquire(&path.to_string_lossy()).unwrap();

        let err = store.append("busy.xlsx", "Sheet1", &[json!("E1")]).unwrap_err();
        assert!(matches!(err, RowStoreError::FileLocked(_)));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_update_on_missing_file_or_sheet() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.update_row("nope.xlsx", "Sheet1", 2, &[json!("x")], 1),
            Err(RowStoreError::FileNotFound(_))
        ));

        store.append("staff.xlsx", "Sheet1", &[json!("ID")]).unwrap();
        assert!(matches!(
            store.delete_row("staff.xlsx", "Other", 2),
            Err(RowStoreError::SheetNotFound(_))
        ));
    }

    #[test]
    fn test_failed_mutation_is_not_saved() {
        let (_dir, store) = test_store();
        store.append("staff.xlsx", "Sheet1", &[json!("ID"), json!("Name")]).unwrap();
        store.append("staff.xlsx", "Sheet1", &[json!("E1"), json!("Ann")]).unwrap();

        let target = RowTarget::Lookup {
            column: "ID".to_string(),
            value: "E9".into(),
            process_all: true,
        };
        let err = store
            .update_fields("staff.xlsx", "Sheet1", &target, json!({"Name": "x"}).as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, RowStoreError::NoMatch { .. }));

        let rows = store.read("staff.xlsx", "Sheet1", None).unwrap();
        assert_eq!(rows, vec![vec![json!("ID"), json!("Name")], vec![json!("E1"), json!("Ann")]]);
        assert!(store.locks().snapshot().iter().all(|lock| !lock.held));
    }

    #[test]
    fn test_list_files_and_sheets() {
        let (dir, store) = test_store();
        store.append("b.xlsx", "Sheet1", &[json!("x")]).unwrap();
        store.append("a.xlsx", "People", &[json!("x")]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        assert_eq!(store.list_files().unwrap(), vec!["a.xlsx", "b.xlsx"]);
        assert_eq!(store.list_sheets("a.xlsx").unwrap(), vec!["People"]);
        assert!(matches!(
            store.list_sheets("c.xlsx"),
            Err(RowStoreError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_compact_removes_blank_left_by_batch() {
        let (_dir, store) = test_store();
        for id in ["ID", "E1", "E2", "E3"] {
            store.append("c.xlsx", "Sheet1", &[json!(id)]).unwrap();
        }

        // Batch only trims trailing blanks afterwards, so row 3 stays blank on disk
        let blank: Vec<BatchOperation> =
            serde_json::from_value(json!([{"type": "update", "row": 3, "values": [""]}])).unwrap();
        store.batch("c.xlsx", "Sheet1", &blank).unwrap();

        assert_eq!(store.compact("c.xlsx", "Sheet1", CompactionMode::Trailing).unwrap(), 0);
        assert_eq!(store.compact("c.xlsx", "Sheet1", CompactionMode::Full).unwrap(), 1);
        assert_eq!(store.compact("c.xlsx", "Sheet1", CompactionMode::Full).unwrap(), 0);

        let rows = store.read("c.xlsx", "Sheet1", None).unwrap();
        assert_eq!(rows, vec![vec![json!("ID")], vec![json!("E1")], vec![json!("E3")]]);
        assert_eq!(store.append("c.xlsx", "Sheet1", &[json!("E4")]).unwrap(), 4);
    }

    #[test]
    fn test_status_reports_config() {
        let (_dir, store) = test_store();
        let status = store.status();
        assert_eq!(status.service, SERVICE_NAME);
        assert_eq!(status.status, "running");
        assert!((status.lock_timeout - 0.2).abs() < 1e-9);
    }
}
