//! Run lock held in the data directory while a playground is up.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::PlaygroundError, utils::unix_now};

/// Name of the lock file under the data directory.
pub const LOCK_FILE: &str = "playground.lock";

/// Contents of the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process that took the lock.
    pub pid: u32,
    /// Unix time the lock was taken.
    pub started_at: u64,
}

/// Exclusive claim on a data directory.
///
/// Dropping the guard removes the lock file unless [`RunLock::keep`] was called,
/// in which case the file stays until [`RunLock::release`].
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    kept: bool,
}

impl RunLock {
    /// Path of the lock file for `data_dir`.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(LOCK_FILE)
    }

    /// Takes the lock, failing with [`PlaygroundError::AlreadyRunning`] if it is held.
    pub fn acquire(data_dir: &Path) -> Result<Self, PlaygroundError> {
        let path = Self::path_in(data_dir);
        let info = LockInfo { pid: std::process::id(), started_at: unix_now() };
        let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PlaygroundError::AlreadyRunning(path));
            }
            Err(e) => return Err(PlaygroundError::io(format!("create {}", path.display()), e)),
        };
        let guard = Self { path, kept: false };
        serde_json::to_writer(&mut file, &info)
            .map_err(|e| PlaygroundError::io(format!("write {}", guard.path.display()), e.into()))?;
        debug!(path = %guard.path.display(), pid = info.pid, "run lock acquired");
        Ok(guard)
    }

    /// Leaves the lock file in place after the guard is dropped.
    pub fn keep(mut self) {
        self.kept = true;
    }

    /// Reads the current holder, if any.
    pub fn holder(data_dir: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(Self::path_in(data_dir)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Removes the lock file. Returns whether one existed.
    pub fn release(data_dir: &Path) -> Result<bool, PlaygroundError> {
        let path = Self::path_in(data_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "run lock released");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PlaygroundError::io(format!("remove {}", path.display()), e)),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove run lock");
        }
    }
}
