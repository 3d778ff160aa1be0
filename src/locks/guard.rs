//! Marker-file mutual exclusion.

use super::file_lock::POLL_INTERVAL;
use super::metadata::MarkerMetadata;
use crate::error::{CmdGptError, Result};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// RAII guard for a `<resource>.lock` marker file.
///
/// The marker is created with `create_new` semantics, so only one holder can
/// exist at a time, and is deleted when the guard is dropped. A holder that is
/// killed leaves its marker behind; `cmdgpt locks clear` removes it by hand.
#[derive(Debug)]
pub struct ScopedLockFile {
    /// Path to the marker file.
    path: PathBuf,

    /// Whether the marker has been released manually.
    released: bool,
}

impl ScopedLockFile {
    /// Marker path used for `resource`.
    pub fn marker_path_for<P: AsRef<Path>>(resource: P) -> PathBuf {
        let mut name: OsString = resource.as_ref().as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Create the marker for `resource`, polling until it is free or `timeout`
    /// elapses. A zero `timeout` waits without bound.
    ///
    /// # Errors
    ///
    /// * `CmdGptError::LockTimeout` - the marker stayed in place past `timeout`
    /// * `CmdGptError::LockIoError` - the marker could not be created or written
    pub fn acquire<P: AsRef<Path>>(resource: P, timeout: Duration) -> Result<Self> {
        let path = Self::marker_path_for(resource);
        let start = Instant::now();

        loop {
            if let Some(guard) = Self::try_create(&path)? {
                return Ok(guard);
            }

            if !timeout.is_zero() && start.elapsed() >= timeout {
                let holder = MarkerMetadata::from_file(&path);
                return Err(CmdGptError::LockTimeout(format!(
                    "'{}' is held by {}",
                    path.display(),
                    holder.describe()
                )));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Make a single attempt to create the marker. Returns `Ok(None)` if busy.
    pub fn try_acquire<P: AsRef<Path>>(resource: P) -> Result<Option<Self>> {
        Self::try_create(&Self::marker_path_for(resource))
    }

    fn try_create(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                CmdGptError::LockIoError(format!(
                    "failed to create marker directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CmdGptError::LockIoError(format!(
                    "failed to create marker '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let text = MarkerMetadata::current().to_text();
        let written = file.write_all(text.as_bytes());
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(path);
            return Err(CmdGptError::LockIoError(format!(
                "failed to write marker '{}': {}",
                path.display(),
                e
            )));
        }

        debug!(path = %path.display(), "marker acquired");
        Ok(Some(Self {
            path: path.to_path_buf(),
            released: false,
        }))
    }

    /// Get the path to the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manually release the marker, reporting deletion failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            CmdGptError::LockIoError(format!(
                "failed to release marker '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for ScopedLockFile {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to release marker");
        }
    }
}
