//! `flock(2)` backend.

use super::LockBackend;
use crate::locks::types::LockMode;
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

/// BSD-style whole-file locks, owned by the open file description.
pub(crate) struct Flock;

impl Flock {
    fn call(file: &File, operation: libc::c_int) -> io::Result<bool> {
        loop {
            // SAFETY: the descriptor comes from a live `File` borrowed for the
            // duration of the call, and `operation` is a valid flock operation.
            let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
            if rc == 0 {
                return Ok(true);
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => {
                    return Ok(false);
                }
                _ => return Err(err),
            }
        }
    }
}

impl LockBackend for Flock {
    const SUPPORTS_CONVERSION: bool = true;

    fn try_lock(file: &File, mode: LockMode) -> io::Result<bool> {
        let operation = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        };
        Self::call(file, operation | libc::LOCK_NB)
    }

    fn unlock(file: &File) -> io::Result<()> {
        Self::call(file, libc::LOCK_UN).map(|_| ())
    }
}
