use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RowStoreError};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BATCH_LOCK_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing knobs for the file lock manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a single operation waits for a file lock
    pub timeout: Duration,
    /// Wait budget for batch operations
    pub batch_timeout: Duration,
    /// Sleep between non-blocking acquisition attempts
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Where a positional append lands when the sheet has no non-blank rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptySheetAppend {
    /// Write row 1; those values become the header row
    #[default]
    FirstRow,
    /// Refuse with `NoHeaders`; the header row must exist first
    RequireHeaders,
}

impl std::str::FromStr for EmptySheetAppend {
    type Err = RowStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row1" | "first-row" => Ok(EmptySheetAppend::FirstRow),
            "require-headers" => Ok(EmptySheetAppend::RequireHeaders),
            other => Err(RowStoreError::Config(format!(
                "unknown empty sheet append policy '{}' (expected row1 or require-headers)",
                other
            ))),
        }
    }
}

/// Process-level configuration for the row store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub lock: LockConfig,
    pub empty_sheet_append: EmptySheetAppend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            lock: LockConfig::default(),
            empty_sheet_append: EmptySheetAppend::default(),
        }
    }
}

impl StoreConfig {
    /// Build a config from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = StoreConfig::default();

        if let Some(dir) = lookup("EXCEL_ROOT_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(raw) = lookup("LOCK_TIMEOUT") {
            config.lock.timeout = parse_seconds("LOCK_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("BATCH_LOCK_TIMEOUT") {
            config.lock.batch_timeout = parse_seconds("BATCH_LOCK_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("LOCK_POLL_INTERVAL_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                RowStoreError::Config(format!("LOCK_POLL_INTERVAL_MS must be an integer, got '{}'", raw))
            })?;
            config.lock.poll_interval = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup("EMPTY_SHEET_APPEND") {
            config.empty_sheet_append = raw.parse()?;
        }

        Ok(config)
    }
}

/// Parse a (possibly fractional) number of seconds such as "30" or "0.5"
pub fn parse_seconds(name: &str, raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| RowStoreError::Config(format!("{} must be a number of seconds, got '{}'", name, raw)))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(RowStoreError::Config(format!("{} must be non-negative, got '{}'", name, raw)));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| RowStoreError::Config(format!("{} is out of range ('{}'): {}", name, raw, e)))
}
