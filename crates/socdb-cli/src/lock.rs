//! Single-instance guard for scheduled collection runs.
//!
//! The guard holds an exclusive OS advisory lock on a well-known file. The
//! OS drops the lock when the process dies, so a crash never leaves a stale
//! holder behind even though the file itself may survive.

use std::fs::{File, OpenOptions, TryLockError};
use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another collection run holds {path} ({holder})")]
    Held { path: PathBuf, holder: String },

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents written into the lock file while it is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Reopen attempts when the lock file is swapped out underneath us.
const OPEN_ATTEMPTS: usize = 3;

/// Held lock. Dropping it deletes the file and releases the OS lock.
#[derive(Debug)]
pub struct SingletonLock {
    path: PathBuf,
    file: Option<File>,
}

impl SingletonLock {
    /// Takes the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Held`] when another handle owns the lock, or
    /// [`LockError::Io`] if the file cannot be opened or written.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }

        for _ in 0..OPEN_ATTEMPTS {
            let file = open_lock_file(path)?;
            if let Some(lock) = Self::claim(path, file)? {
                return Ok(lock);
            }
            tracing::debug!(path = %path.display(), "lock file replaced while locking; reopening");
        }
        Err(LockError::Held {
            path: path.to_path_buf(),
            holder: "lock file keeps being replaced".to_string(),
        })
    }

    /// Locks an already opened handle for `path`.
    ///
    /// Returns `Ok(None)` when the handle no longer names the file at `path`:
    /// a releasing holder deletes the file before unlocking it, so a lock won
    /// on that handle guards nothing.
    fn claim(path: &Path, mut file: File) -> Result<Option<Self>, LockError> {
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                let holder = std::fs::read_to_string(path)
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "holder unknown".to_string());
                return Err(LockError::Held {
                    path: path.to_path_buf(),
                    holder,
                });
            }
            Err(TryLockError::Error(e)) => return Err(io_error(path, e)),
        }

        if !is_current_file(&file, path).map_err(|e| io_error(path, e))? {
            return Ok(None);
        }

        let holder = LockHolder {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let body = serde_json::to_string(&holder)
            .map_err(|e| io_error(path, std::io::Error::other(e)))?;
        file.set_len(0).map_err(|e| io_error(path, e))?;
        file.write_all(body.as_bytes()).map_err(|e| io_error(path, e))?;
        file.flush().map_err(|e| io_error(path, e))?;

        tracing::debug!(path = %path.display(), pid = holder.pid, "acquired singleton lock");
        Ok(Some(Self {
            path: path.to_path_buf(),
            file: Some(file),
        }))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    // No truncate here: the current holder's details must survive a failed attempt.
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| io_error(path, e))
}

/// Whether `file` is still the file linked at `path`.
#[cfg(unix)]
fn is_current_file(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt as _;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// Windows refuses to delete a file another process has open.
#[cfg(not(unix))]
fn is_current_file(_file: &File, _path: &Path) -> std::io::Result<bool> {
    Ok(true)
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        // Delete before unlocking.
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock");
            }
        }
    }
}

/// Runs `body` while holding the lock at `path`.
///
/// The lock is released when `body` finishes, fails, or is dropped
/// mid-flight.
///
/// # Errors
///
/// Returns [`LockError`] without running `body` when the lock cannot be taken.
pub async fn with_singleton_lock<T, Fut>(path: &Path, body: Fut) -> Result<T, LockError>
where
    Fut: Future<Output = T>,
{
    let guard = SingletonLock::acquire(path)?;
    let value = body.await;
    drop(guard);
    Ok(value)
}
