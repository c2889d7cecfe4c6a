//! Single-writer lock for merge runs.
//!
//! Concurrent merges against the same model store are not a supported
//! scenario; callers serialize them with an advisory file lock held for the
//! duration of a run. The lock file records its holder for diagnostics.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TdmError};

/// Advisory exclusive lock scoped to one model store.
pub struct ModelLock {
    #[allow(dead_code)]
    lock_file: File,
    #[allow(dead_code)]
    lock_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl ModelLock {
    const LOCK_FILENAME: &'static str = "tdm.lock";

    /// Acquire the exclusive lock, blocking until it is free.
    pub fn acquire(root: &Path) -> Result<Self> {
        let (lock_file, lock_path) = Self::open_lock_file(root)?;
        lock_file
            .lock_exclusive()
            .map_err(|e| TdmError::LockFailed(format!("acquire exclusive lock: {e}")))?;
        Self::write_holder(&lock_path);
        debug!("acquired model lock at {:?}", lock_path);
        Ok(Self {
            lock_file,
            lock_path,
        })
    }

    /// Try to acquire the lock without blocking. `None` means another run
    /// holds it.
    pub fn try_acquire(root: &Path) -> Result<Option<Self>> {
        let (lock_file, lock_path) = Self::open_lock_file(root)?;
        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("model lock held by another process");
                return Ok(None);
            }
            Err(e) => {
                return Err(TdmError::LockFailed(format!("try acquire lock: {e}")));
            }
        }
        Self::write_holder(&lock_path);
        debug!("acquired model lock (non-blocking) at {:?}", lock_path);
        Ok(Some(Self {
            lock_file,
            lock_path,
        }))
    }

    fn open_lock_file(root: &Path) -> Result<(File, PathBuf)> {
        let lock_path = root.join(Self::LOCK_FILENAME);
        fs::create_dir_all(root)?;
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| TdmError::LockFailed(format!("open lock file: {e}")))?;
        Ok((lock_file, lock_path))
    }

    fn write_holder(lock_path: &Path) {
        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let holder_json = serde_json::to_string(&holder).unwrap_or_default();
        fs::write(lock_path, holder_json).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_reacquire_after_drop() {
        let tmp = TempDir::new().unwrap();
        let lock = ModelLock::acquire(tmp.path()).unwrap();
        drop(lock);
        let lock = ModelLock::try_acquire(tmp.path()).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn lock_file_records_holder_pid() {
        let tmp = TempDir::new().unwrap();
        let _lock = ModelLock::acquire(tmp.path()).unwrap();
        let raw = fs::read_to_string(tmp.path().join("tdm.lock")).unwrap();
        let holder: LockHolder = serde_json::from_str(&raw).unwrap();
        assert_eq!(holder.pid, std::process::id());
    }
}
