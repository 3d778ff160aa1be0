//! Cross-process locking for cmdgpt.
//!
//! Two mechanisms are provided:
//! - [`FileLock`]: an OS advisory lock (shared or exclusive) on one path,
//!   released on drop. Backed by `flock` on Unix and `LockFileEx` on Windows.
//! - [`ScopedLockFile`]: a marker file whose existence means "busy", created
//!   with exclusive-create semantics and deleted on drop.
//!
//! # Sidecar Lock Files
//!
//! Files replaced by atomic rename are never locked directly: the rename
//! swaps the inode and the lock would stay on the old one. Callers lock a
//! sidecar next to the resource instead, by convention `<resource>.lck`.
//!
//! # Marker Files
//!
//! Markers live at `<resource>.lock` and contain the holder's pid and owner.
//! They are not crash-safe. A killed holder leaves its marker in place until
//! it is removed with [`clear_marker`].

mod backend;
mod file_lock;
mod guard;
mod metadata;
mod operations;
mod types;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

pub use file_lock::{FileLock, POLL_INTERVAL};
pub use guard::ScopedLockFile;
pub use metadata::MarkerMetadata;
pub use operations::{clear_marker, list_markers};
pub use types::{LockMode, MarkerInfo};

/// Sidecar lock path for a resource: `<resource>.lck`.
pub fn sidecar_path<P: AsRef<Path>>(resource: P) -> PathBuf {
    let mut name = resource.as_ref().as_os_str().to_owned();
    name.push(".lck");
    PathBuf::from(name)
}
