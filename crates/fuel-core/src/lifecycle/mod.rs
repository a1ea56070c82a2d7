//! Lifecycle Manager (§4.9): PID file with advisory lock, instance id, shutdown sequencing.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another fuel consume daemon is already running (pid {0})")]
    AlreadyRunning(i32),
    #[error("failed to acquire lock at {path}: {source}")]
    LockFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidFile {
    pub pid: i32,
    pub started_at: DateTime<Utc>,
    pub instance_id: Uuid,
    pub port: u16,
}

/// Holds the advisory lock for the lifetime of the daemon; dropping it (or calling
/// `cleanup`) releases the lock and removes both files.
pub struct LifecycleManager {
    pid_path: std::path::PathBuf,
    lock_path: std::path::PathBuf,
    lock_file: Option<File>,
}

impl LifecycleManager {
    pub fn new(pid_path: impl Into<std::path::PathBuf>, lock_path: impl Into<std::path::PathBuf>) -> Self {
        Self { pid_path: pid_path.into(), lock_path: lock_path.into(), lock_file: None }
    }

    /// `start(port)` (§4.9 steps 1-3).
    pub fn start(&mut self, port: u16) -> Result<PidFile, LifecycleError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|source| LifecycleError::LockFailed {
                path: self.lock_path.display().to_string(),
                source,
            })?;

        if lock_file.try_lock_exclusive().is_err() {
            if let Some(existing) = self.read_pid_file_if_live() {
                return Err(LifecycleError::AlreadyRunning(existing.pid));
            }
            // Lock held by a process whose PID file we can't corroborate as live; still
            // refuse to race the holder for the lock itself.
            lock_file
                .lock_exclusive()
                .map_err(|source| LifecycleError::LockFailed {
                    path: self.lock_path.display().to_string(),
                    source,
                })?;
        }

        self.remove_stale_pid_file();

        let pid_file = PidFile {
            pid: std::process::id() as i32,
            started_at: Utc::now(),
            instance_id: Uuid::new_v4(),
            port,
        };
        let json = serde_json::to_string_pretty(&pid_file)?;
        std::fs::write(&self.pid_path, json)?;

        self.lock_file = Some(lock_file);
        Ok(pid_file)
    }

    /// Stale detection (§4.9 step 2): invalid JSON, missing `pid`, or a pid that does not
    /// exist are all treated as absent.
    fn read_pid_file_if_live(&self) -> Option<PidFile> {
        let contents = std::fs::read_to_string(&self.pid_path).ok()?;
        let parsed: PidFile = serde_json::from_str(&contents).ok()?;
        if pid_is_alive(parsed.pid) {
            Some(parsed)
        } else {
            None
        }
    }

    fn remove_stale_pid_file(&self) {
        if self.pid_path.exists() && self.read_pid_file_if_live().is_none() {
            let _ = std::fs::remove_file(&self.pid_path);
        }
    }

    /// `cleanup()`: delete PID and lock files, releasing the lock.
    pub fn cleanup(&mut self) {
        if let Some(lock_file) = self.lock_file.take() {
            let _ = FileExt::unlock(&lock_file);
        }
        let _ = std::fs::remove_file(&self.pid_path);
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(unix)]
fn pid_is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs no action beyond existence/permission checks.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: i32) -> bool {
    false
}

/// Reads and validates a PID file at `path` without holding the lock (used by `consume
/// status`). Returns `None` for anything stale per the same rules as `start`.
pub fn read_pid_file(path: &Path) -> Option<PidFile> {
    let contents = std::fs::read_to_string(path).ok()?;
    let parsed: PidFile = serde_json::from_str(&contents).ok()?;
    if pid_is_alive(parsed.pid) {
        Some(parsed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_writes_valid_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("consume.pid");
        let lock_path = dir.path().join("consume.pid.lock");

        let mut lifecycle = LifecycleManager::new(&pid_path, &lock_path);
        let pid_file = lifecycle.start(7117).unwrap();
        assert_eq!(pid_file.pid, std::process::id() as i32);

        let on_disk = read_pid_file(&pid_path).unwrap();
        assert_eq!(on_disk.pid, pid_file.pid);
        assert_eq!(on_disk.port, 7117);
    }

    #[test]
    fn stale_pid_file_with_dead_pid_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("consume.pid");
        let lock_path = dir.path().join("consume.pid.lock");

        let stale = PidFile {
            pid: 999_999,
            started_at: Utc::now(),
            instance_id: Uuid::new_v4(),
            port: 7117,
        };
        std::fs::write(&pid_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let mut lifecycle = LifecycleManager::new(&pid_path, &lock_path);
        let fresh = lifecycle.start(7118).unwrap();
        assert_ne!(fresh.instance_id, stale.instance_id);
        assert_eq!(fresh.pid, std::process::id() as i32);
    }

    #[test]
    fn invalid_json_pid_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("consume.pid");
        let lock_path = dir.path().join("consume.pid.lock");
        std::fs::write(&pid_path, "not json").unwrap();

        let mut lifecycle = LifecycleManager::new(&pid_path, &lock_path);
        assert!(lifecycle.start(7117).is_ok());
    }

    #[test]
    fn cleanup_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("consume.pid");
        let lock_path = dir.path().join("consume.pid.lock");

        let mut lifecycle = LifecycleManager::new(&pid_path, &lock_path);
        lifecycle.start(7117).unwrap();
        lifecycle.cleanup();

        assert!(!pid_path.exists());
        assert!(!lock_path.exists());
    }
}
