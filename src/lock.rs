//! Per-file mutual exclusion.
//!
//! Every workbook path gets one lock entry, created on first use and kept for
//! the lifetime of the manager. Acquisition never blocks on the entry itself:
//! it makes a non-blocking attempt, sleeps for the poll interval and retries
//! until the timeout runs out. Locks are not reentrant and waiters are not
//! served in arrival order.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::LockConfig;

struct LockEntry {
    held: AtomicBool,
    last_acquired: Mutex<Option<DateTime<Utc>>>,
}

impl LockEntry {
    fn new() -> Self {
        LockEntry {
            held: AtomicBool::new(false),
            last_acquired: Mutex::new(None),
        }
    }

    fn try_take(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

/// Registry of file locks, one per path
pub struct FileLockManager {
    entries: Mutex<HashMap<String, Arc<LockEntry>>>,
    config: LockConfig,
}

/// Snapshot of a single lock entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatus {
    pub path: String,
    pub held: bool,
    pub last_acquired: Option<DateTime<Utc>>,
}

impl FileLockManager {
    pub fn new(config: LockConfig) -> Self {
        tracing::info!(
            timeout_secs = config.timeout.as_secs_f64(),
            poll_ms = config.poll_interval.as_millis() as u64,
            "FileLockManager initialized"
        );
        FileLockManager {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Look up or lazily create the entry for `path`. The registry lock is
    /// only held for the map access.
    fn entry(&self, path: &str) -> Arc<LockEntry> {
        let mut entries = self.entries.lock();
        entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(LockEntry::new()))
            .clone()
    }

    /// Single non-blocking attempt
    pub fn try_acquire(&self, path: &str) -> Option<FileLockGuard> {
        let entry = self.entry(path);
        if entry.try_take() {
            Some(FileLockGuard::new(path, entry))
        } else {
            None
        }
    }

    /// Acquire with the default timeout
    pub fn acquire(&self, path: &str) -> Option<FileLockGuard> {
        self.acquire_with_timeout(path, self.config.timeout)
    }

    /// Poll until the lock is free or `timeout` has elapsed. Returns `None` on
    /// timeout; the caller decides how to surface it.
    pub fn acquire_with_timeout(&self, path: &str, timeout: Duration) -> Option<FileLockGuard> {
        let start = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire(path) {
                return Some(guard);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::error!(
                    path = %path,
                    timeout_secs = timeout.as_secs_f64(),
                    "Lock timeout"
                );
                return None;
            }

            thread::sleep(self.config.poll_interval.min(timeout - elapsed));
        }
    }

    /// Current state of every known entry, sorted by path
    pub fn snapshot(&self) -> Vec<LockStatus> {
        let entries: Vec<(String, Arc<LockEntry>)> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut statuses: Vec<LockStatus> = entries
            .into_iter()
            .map(|(path, entry)| LockStatus {
                path,
                held: entry.held.load(Ordering::Acquire),
                last_acquired: *entry.last_acquired.lock(),
            })
            .collect();
        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        statuses
    }
}

/// Held file lock; released on drop
pub struct FileLockGuard {
    path: String,
    entry: Arc<LockEntry>,
    acquired: Instant,
}

impl FileLockGuard {
    fn new(path: &str, entry: Arc<LockEntry>) -> Self {
        *entry.last_acquired.lock() = Some(Utc::now());
        tracing::info!(path = %path, "Lock acquired");
        FileLockGuard {
            path: path.to_string(),
            entry,
            acquired: Instant::now(),
        }
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.entry.held.store(false, Ordering::Release);
        tracing::info!(
            path = %self.path,
            held_secs = self.acquired.elapsed().as_secs_f64(),
            "Lock released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn is_held(manager: &FileLockManager, path: &str) -> bool {
        manager.snapshot().iter().any(|s| s.path == path && s.held)
    }

    fn fast_config() -> LockConfig {
        LockConfig {
            timeout: Duration::from_millis(200),
            batch_timeout: Duration::from_millis(400),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let manager = FileLockManager::new(fast_config());
        let guard = manager.acquire("a.xlsx").expect("lock should be free");
        assert!(is_held(&manager, "a.xlsx"));
        drop(guard);
        assert!(!is_held(&manager, "a.xlsx"));
        assert!(manager.try_acquire("a.xlsx").is_some());
    }

    #[test]
    fn test_not_reentrant() {
        let manager = FileLockManager::new(fast_config());
        let _guard = manager.acquire("a.xlsx").unwrap();

        let started = Instant::now();
        let second = manager.acquire_with_timeout("a.xlsx", Duration::from_millis(50));
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_zero_timeout_is_single_attempt() {
        let manager = FileLockManager::new(fast_config());
        let _guard = manager.acquire("a.xlsx").unwrap();
        assert!(manager.acquire_with_timeout("a.xlsx", Duration::ZERO).is_none());
    }

    #[test]
    fn test_different_paths_are_independent() {
        let manager = FileLockManager::new(fast_config());
        let _a = manager.acquire("a.xlsx").unwrap();
        let b = manager.try_acquire("b.xlsx");
        assert!(b.is_some());
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let manager = Arc::new(FileLockManager::new(fast_config()));
        let guard = manager.acquire("a.xlsx").unwrap();

        let waiter = {
            let manager = manager.clone();
            thread::spawn(move || manager.acquire_with_timeout("a.xlsx", Duration::from_secs(2)).is_some())
        };

        thread::sleep(Duration::from_millis(30));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let manager = Arc::new(FileLockManager::new(LockConfig {
            timeout: Duration::from_secs(10),
            ..fast_config()
        }));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _guard = manager.acquire("shared.xlsx").unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_records_entries() {
        let manager = FileLockManager::new(fast_config());
        let _b = manager.acquire("b.xlsx").unwrap();
        drop(manager.acquire("a.xlsx").unwrap());

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, "a.xlsx");
        assert!(!snapshot[0].held);
        assert!(snapshot[0].last_acquired.is_some());
        assert_eq!(snapshot[1].path, "b.xlsx");
        assert!(snapshot[1].held);
    }
}
