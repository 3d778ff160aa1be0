//! `LockFileEx` backend, through `fs4`.

use super::LockBackend;
use crate::locks::types::LockMode;
use fs4::fs_std::FileExt;
use std::fs::File;
use std::io;

/// Whole-file byte-range locks owned by the handle.
///
/// Windows cannot convert a held lock in place, so conversions are refused
/// before any call is made.
pub(crate) struct Win32Lock;

impl LockBackend for Win32Lock {
    const SUPPORTS_CONVERSION: bool = false;

    fn try_lock(file: &File, mode: LockMode) -> io::Result<bool> {
        // Fully qualified: std's inherent `File` lock methods shadow the trait's.
        match mode {
            LockMode::Shared => FileExt::try_lock_shared(file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(file),
        }
    }

    fn unlock(file: &File) -> io::Result<()> {
        FileExt::unlock(file)
    }
}
