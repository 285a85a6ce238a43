//! Advisory lock file guarding mutually exclusive operations.
//!
//! A lock record is a small JSON file naming the holder's PID, the
//! command it was running and when it started. A record is valid only
//! while its PID is alive; stale records from crashed runs are deleted
//! on sight, so a crash never wedges the launcher.
//!
//! The lock is advisory and check-then-act. Two invocations started in
//! the same instant can both pass the check; the window is accepted.

use crate::error::{PortableError, Result};
use crate::platform::process::is_process_alive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Contents of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
    pub command: String,
}

/// Handle to the launcher's lock file.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record, deleting it if stale or unreadable.
    ///
    /// Returns the record only when its holder is still alive.
    pub fn current_holder(&self) -> Option<LockRecord> {
        if !self.path.exists() {
            return None;
        }

        let record: LockRecord = match std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
        {
            Some(record) => record,
            None => {
                warn!("Unreadable lock file {}, removing", self.path.display());
                let _ = std::fs::remove_file(&self.path);
                return None;
            }
        };

        if is_process_alive(record.pid) {
            Some(record)
        } else {
            debug!(
                "Removing stale lock held by dead pid {} ({})",
                record.pid, record.command
            );
            let _ = std::fs::remove_file(&self.path);
            None
        }
    }

    /// Take the lock for this process, failing if a live holder exists.
    pub fn acquire(&self, command: &str) -> Result<()> {
        if let Some(holder) = self.current_holder() {
            return Err(PortableError::AlreadyRunning {
                pid: holder.pid,
                command: holder.command,
            });
        }

        let record = LockRecord {
            pid: std::process::id(),
            timestamp: Utc::now(),
            command: command.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PortableError::io_with_path(e, parent))?;
        }

        let contents = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, contents)
            .map_err(|e| PortableError::io_with_path(e, &self.path))?;

        debug!("Acquired lock for `{}`", command);
        Ok(())
    }

    /// Drop the lock if this process holds it.
    ///
    /// Never fails; a missing or foreign lock file is left alone.
    pub fn release(&self) {
        if !self.path.exists() {
            return;
        }

        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str::<LockRecord>(&contents).ok())
            .map(|record| record.pid == std::process::id())
            .unwrap_or(true);

        if ours {
            let _ = std::fs::remove_file(&self.path);
            debug!("Released lock");
        } else {
            debug!("Lock held by another process, leaving in place");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_in_tempdir() -> (LockFile, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let lock = LockFile::new(tmp.path().join("launcher.lock"));
        (lock, tmp)
    }

    #[test]
    fn test_acquire_and_release() {
        let (lock, _tmp) = lock_in_tempdir();

        lock.acquire("start").unwrap();
        let holder = lock.current_holder().unwrap();
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(holder.command, "start");

        lock.release();
        assert!(lock.current_holder().is_none());
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let (lock, _tmp) = lock_in_tempdir();

        lock.acquire("start").unwrap();
        let err = lock.acquire("upgrade").unwrap_err();
        assert!(matches!(err, PortableError::AlreadyRunning { .. }));

        lock.release();
    }

    #[test]
    fn test_stale_lock_is_self_healing() {
        let (lock, _tmp) = lock_in_tempdir();

        let stale = LockRecord {
            pid: 4_000_000_000,
            timestamp: Utc::now(),
            command: "start".into(),
        };
        std::fs::write(lock.path(), serde_json::to_string(&stale).unwrap()).unwrap();

        // The dead holder is discarded and acquisition succeeds
        assert!(lock.current_holder().is_none());
        assert!(!lock.path().exists());
        lock.acquire("start").unwrap();
    }

    #[test]
    fn test_corrupt_lock_is_removed() {
        let (lock, _tmp) = lock_in_tempdir();

        std::fs::write(lock.path(), "{not json").unwrap();
        assert!(lock.current_holder().is_none());
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_release_leaves_foreign_lock() {
        let (lock, _tmp) = lock_in_tempdir();

        // current_holder would delete this dead-pid record, but release
        // must not touch a lock that names another process
        let foreign = LockRecord {
            pid: std::process::id() + 1,
            timestamp: Utc::now(),
            command: "start".into(),
        };
        std::fs::write(lock.path(), serde_json::to_string(&foreign).unwrap()).unwrap();

        lock.release();
        assert!(lock.path().exists());
    }
}
