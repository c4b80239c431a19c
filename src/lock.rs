// src/lock.rs

//! Exclusive lock over the shared fetch directory
//!
//! Every update invocation serializes through one coarse lock covering the
//! whole fetch directory, so concurrent invocations cannot corrupt each
//! other's checkouts. Acquisition retries up to a bounded wait and then
//! fails the run rather than hanging indefinitely.
//!
//! The lock is an OS-level `flock`; it is released when the holder drops it
//! or exits, so a crashed run can never leave the area locked.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Bounded wait before giving up on the lock
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Exclusive lock held for the duration of one update run
pub struct UpdateLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl UpdateLock {
    /// Acquire the lock, retrying until the default bounded wait elapses
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::acquire_timeout(path, LOCK_TIMEOUT)
    }

    /// Acquire the lock, retrying until `timeout` elapses
    pub fn acquire_timeout<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    log::info!("Acquired update lock at {:?}", path);
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout(format!(
                            "{} still held after {:?}",
                            path.display(),
                            timeout
                        )));
                    }
                    log::debug!("Update lock busy at {:?}, retrying", path);
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "Failed to acquire update lock: {}",
                        e
                    )));
                }
            }
        }
    }

    /// Check if the lock is currently held (by any process)
    ///
    /// Non-destructive; useful for diagnostics only.
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();

        if !path.exists() {
            return false;
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return false,
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = fs2::FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        // Lock is automatically released when file is closed
        log::info!("Released update lock at {:?}", self.path);
    }
}
