pub mod commands;
pub mod compaction;
pub mod config;
pub mod error;
pub mod excel;
pub mod grid;
pub mod headers;
pub mod lock;
pub mod lookup;
pub mod mutation;
pub mod store;

pub use commands::{dispatch, dispatch_json, AppState, CommandError, Request};
pub use config::{EmptySheetAppend, LockConfig, StoreConfig};
pub use error::{ErrorClass, Result, RowStoreError};
pub use grid::{CellValue, Grid, MemorySheet};
pub use lock::{FileLockGuard, FileLockManager};
pub use mutation::{BatchOperation, BatchResult, RowTarget};
pub use store::{RowStore, ServiceStatus};

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `level` is an `EnvFilter` directive
/// such as `info` or `sheetrows=debug`; unparsable values fall back to `info`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
