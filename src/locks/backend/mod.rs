//! Platform locking backends.
//!
//! Exactly one backend is compiled per target and exposed as [`Native`].
//! Every backend locks the whole file through the given handle. Locks held
//! through different open handles conflict with each other, even inside one
//! process, so two `FileLock`s on the same path exclude each other the same
//! way two processes do.

use super::types::LockMode;
use std::fs::File;
use std::io;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) type Native = unix::Flock;
#[cfg(windows)]
pub(crate) type Native = windows::Win32Lock;

/// Operations a platform must provide for [`super::FileLock`].
pub(crate) trait LockBackend {
    /// Whether a held lock can be converted between shared and exclusive in place.
    const SUPPORTS_CONVERSION: bool;

    /// Make one non-blocking attempt to lock `file` in `mode`.
    ///
    /// Returns `Ok(false)` when another holder conflicts. On platforms that
    /// support conversion, calling this on a handle that already holds a lock
    /// converts it; a failed conversion may leave the handle unlocked.
    fn try_lock(file: &File, mode: LockMode) -> io::Result<bool>;

    /// Release whatever lock `file` holds.
    fn unlock(file: &File) -> io::Result<()>;
}
