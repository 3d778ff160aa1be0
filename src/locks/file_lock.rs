//! Advisory whole-file locks with scoped release.

use super::backend::{LockBackend, Native};
use super::types::LockMode;
use crate::error::{CmdGptError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Delay between acquisition attempts while a lock is contended.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest wait to re-take a lock dropped by a refused conversion.
pub(super) const RESTORE_LIMIT: Duration = Duration::from_millis(100);

/// An acquired advisory lock on one path.
///
/// The lock is released when the value is dropped, on every exit path. A
/// `FileLock` can be moved but not cloned, so exactly one owner releases it.
///
/// Locks are not re-entrant: a second request for the same path contends
/// with the first, even from the same thread.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    mode: LockMode,
    timeout: Duration,
    /// `None` once the OS lock has been released.
    file: Option<File>,
}

impl FileLock {
    /// Acquire `mode` on `path`, polling until success or `timeout`.
    ///
    /// A zero `timeout` waits without bound. Parent directories are created
    /// when missing and the lock file itself is created empty.
    ///
    /// # Errors
    ///
    /// * `CmdGptError::LockTimeout` - the lock stayed contended past `timeout`
    /// * `CmdGptError::LockIoError` - the lock file could not be opened or locked
    pub fn acquire<P: AsRef<Path>>(path: P, mode: LockMode, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;
        let start = Instant::now();

        loop {
            if try_lock(&file, &path, mode)? {
                debug!(path = %path.display(), %mode, "lock acquired");
                return Ok(Self {
                    path,
                    mode,
                    timeout,
                    file: Some(file),
                });
            }

            if !timeout.is_zero() && start.elapsed() >= timeout {
                return Err(CmdGptError::LockTimeout(format!(
                    "waited {}ms for {} lock on '{}'",
                    timeout.as_millis(),
                    mode,
                    path.display()
                )));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Acquire a shared lock.
    pub fn shared<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        Self::acquire(path, LockMode::Shared, timeout)
    }

    /// Acquire an exclusive lock.
    pub fn exclusive<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        Self::acquire(path, LockMode::Exclusive, timeout)
    }

    /// Make a single non-blocking attempt. Returns `Ok(None)` if contended.
    pub fn try_acquire<P: AsRef<Path>>(path: P, mode: LockMode) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        if try_lock(&file, &path, mode)? {
            Ok(Some(Self {
                path,
                mode,
                timeout: Duration::ZERO,
                file: Some(file),
            }))
        } else {
            Ok(None)
        }
    }

    /// The locked path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The currently held mode.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Whether the OS lock is still held.
    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    /// Downgrade an exclusive lock to shared without blocking.
    ///
    /// Returns `false` and leaves the lock as it was when the handle is not
    /// exclusive, when the conversion fails, or when the platform cannot
    /// convert locks in place.
    pub fn try_lock_shared(&mut self) -> bool {
        self.try_convert(LockMode::Exclusive, LockMode::Shared)
    }

    /// Upgrade a shared lock to exclusive without blocking.
    ///
    /// Returns `false` when another holder shares the lock, when the handle
    /// is not shared, or when the platform cannot convert locks in place.
    /// On failure the shared lock is still held.
    pub fn try_upgrade(&mut self) -> bool {
        self.try_convert(LockMode::Shared, LockMode::Exclusive)
    }

    fn try_convert(&mut self, from: LockMode, to: LockMode) -> bool {
        if self.mode != from || !Native::SUPPORTS_CONVERSION {
            return false;
        }
        let Some(file) = self.file.as_ref() else {
            return false;
        };

        match Native::try_lock(file, to) {
            Ok(true) => {
                debug!(path = %self.path.display(), %from, %to, "lock converted");
                self.mode = to;
                true
            }
            Ok(false) => {
                self.restore();
                false
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "lock conversion failed");
                self.restore();
                false
            }
        }
    }

    /// Re-establish the current mode after a failed conversion.
    ///
    /// `flock` drops the held lock before attempting the new mode, so a
    /// refused conversion may leave the descriptor unlocked. The old mode is
    /// re-taken here, waiting at most [`restore_limit`]. If that fails the
    /// handle reports itself as unlocked rather than claiming a lock it lost.
    fn restore(&mut self) {
        let Some(file) = self.file.as_ref() else {
            return;
        };
        let limit = restore_limit(self.timeout);
        let start = Instant::now();

        loop {
            match Native::try_lock(file, self.mode) {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to restore lock");
                    break;
                }
            }
            if start.elapsed() >= limit {
                warn!(
                    path = %self.path.display(),
                    mode = %self.mode,
                    "lock lost after refused conversion"
                );
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        self.unlock();
    }

    /// Release the lock now. Calling it again has no effect.
    pub fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = Native::unlock(&file) {
                // Closing the handle below releases the lock regardless.
                debug!(path = %self.path.display(), error = %e, "explicit unlock failed");
            }
            debug!(path = %self.path.display(), mode = %self.mode, "lock released");
        }
    }

    /// Release the lock, reporting an unlock failure.
    pub fn release(mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => Native::unlock(&file).map_err(|e| {
                CmdGptError::LockIoError(format!(
                    "failed to unlock '{}': {}",
                    self.path.display(),
                    e
                ))
            }),
            None => Ok(()),
        }
    }
}

/// Restore wait for a lock taken with `timeout`: never unbounded, and never
/// longer than the timeout itself.
pub(super) fn restore_limit(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        RESTORE_LIMIT
    } else {
        timeout.min(RESTORE_LIMIT)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            CmdGptError::LockIoError(format!(
                "failed to create lock directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            CmdGptError::LockIoError(format!(
                "failed to open lock file '{}': {}",
                path.display(),
                e
            ))
        })
}

fn try_lock(file: &File, path: &Path, mode: LockMode) -> Result<bool> {
    Native::try_lock(file, mode).map_err(|e| {
        CmdGptError::LockIoError(format!(
            "failed to take {} lock on '{}': {}",
            mode,
            path.display(),
            e
        ))
    })
}
