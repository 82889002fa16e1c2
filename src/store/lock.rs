// src/store/lock.rs

//! Cross-process advisory lock on a named lock file.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers; any number may hold it at once.
    Shared,
    /// Writers; excludes every other holder.
    Exclusive,
}

/// Bounded wait for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Sleep between attempts.
    pub wait: Duration,
    /// Total attempts before giving up.
    pub retries: u32,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(100),
            retries: 50,
        }
    }
}

/// An advisory lock held on a file, released when dropped.
///
/// Built on the platform's native file locks (`flock` on Unix,
/// `LockFileEx` on Windows). Two handles conflict even inside one process,
/// so the lock also orders concurrent saves from the same process.
#[derive(Debug)]
pub struct ScopedLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl ScopedLock {
    /// Acquire `mode` on `path`, creating the lock file if needed.
    ///
    /// Retries without blocking the executor; fails with
    /// [`StoreError::LockAcquisition`] once `options.retries` attempts are
    /// used up.
    pub async fn acquire(
        path: &Path,
        mode: LockMode,
        options: LockOptions,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let attempts = options.retries.max(1);
        for attempt in 1..=attempts {
            let res = match mode {
                LockMode::Shared => file.try_lock_shared(),
                LockMode::Exclusive => file.try_lock(),
            };

            match res {
                Ok(()) => {
                    trace!(path = ?path, ?mode, attempt, "lock acquired");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                        mode,
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    debug!(path = ?path, ?mode, attempt, "lock busy; waiting");
                    if attempt < attempts {
                        tokio::time::sleep(options.wait).await;
                    }
                }
                Err(TryLockError::Error(e)) => return Err(StoreError::Io(e)),
            }
        }

        Err(StoreError::LockAcquisition {
            path: path.to_path_buf(),
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!(path = ?self.path, error = %e, "failed to release lock");
        } else {
            trace!(path = ?self.path, mode = ?self.mode, "lock released");
        }
    }
}
