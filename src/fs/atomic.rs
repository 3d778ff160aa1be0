//! Atomic filesystem writes for cmdgpt.
//!
//! Every piece of shared state (cache entries, the rate-limiter record, the
//! config template) is written through [`AtomicFileWriter`], so a concurrent
//! reader in another process sees either the complete old file or the complete
//! new file, never a truncated or mixed one.
//!
//! # Implementation Strategy
//!
//! 1. Create a uniquely named temporary file in the target's directory
//!    (same filesystem, required for an atomic rename)
//! 2. Stream content into it
//! 3. Sync the file to disk (fsync)
//! 4. Rename it over the target
//!
//! A writer dropped before [`AtomicFileWriter::commit`] deletes its temporary
//! file and leaves the target exactly as it was.
//!
//! # Cross-Platform Behavior
//!
//! - **POSIX**: `rename()` replaces the destination atomically.
//! - **Windows**: the rename uses `MoveFileExW` with `MOVEFILE_REPLACE_EXISTING`.
//!   If the platform still refuses because the destination exists, the
//!   destination is removed once and the rename retried.

use crate::error::{CmdGptError, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write-to-temp-then-rename writer for a single target file.
///
/// The writer exclusively owns its temporary file. Moving the writer moves
/// that ownership; it cannot be copied.
#[derive(Debug)]
pub struct AtomicFileWriter {
    /// Final destination of the content.
    target: PathBuf,

    /// Buffered temporary file; `None` once committed or aborted.
    temp: Option<BufWriter<NamedTempFile>>,
}

impl AtomicFileWriter {
    /// Open a temporary file next to `target`, creating parent directories as needed.
    pub fn create<P: AsRef<Path>>(target: P) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let parent = parent_dir(&target);

        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                CmdGptError::AtomicWriteError(format!(
                    "failed to create parent directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let prefix = temp_prefix(&target)?;
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| {
                CmdGptError::AtomicWriteError(format!(
                    "failed to create temporary file in '{}': {}",
                    parent.display(),
                    e
                ))
            })?;

        Ok(Self {
            target,
            temp: Some(BufWriter::new(temp)),
        })
    }

    /// The file this writer will replace on commit.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Path of the temporary file, while the writer is still open.
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_ref().map(|w| w.get_ref().path())
    }

    /// Append bytes to the pending content.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let temp = self.open_temp()?;
        temp.write_all(data).map_err(|e| {
            CmdGptError::AtomicWriteError(format!("failed to write to temporary file: {}", e))
        })
    }

    /// Append text to the pending content.
    pub fn write_str(&mut self, data: &str) -> Result<()> {
        self.write_bytes(data.as_bytes())
    }

    /// Sync the temporary file and atomically rename it over the target.
    ///
    /// On any failure the temporary file is removed. A first rename failure
    /// while the destination exists removes the destination once and retries;
    /// a second failure is returned.
    pub fn commit(mut self) -> Result<()> {
        let writer = self.temp.take().ok_or_else(|| {
            CmdGptError::AtomicWriteError(format!(
                "writer for '{}' is already closed",
                self.target.display()
            ))
        })?;

        let temp = writer.into_inner().map_err(|e| {
            CmdGptError::AtomicWriteError(format!(
                "failed to flush temporary file: {}",
                e.error()
            ))
        })?;

        temp.as_file().sync_all().map_err(|e| {
            CmdGptError::AtomicWriteError(format!("failed to sync temporary file to disk: {}", e))
        })?;

        match temp.persist(&self.target) {
            Ok(_) => {}
            Err(first) => {
                if !self.target.exists() {
                    return Err(CmdGptError::AtomicWriteError(format!(
                        "failed to atomically replace '{}': {}",
                        self.target.display(),
                        first.error
                    )));
                }

                tracing::debug!(
                    target_path = %self.target.display(),
                    error = %first.error,
                    "rename over existing file failed, removing destination and retrying"
                );

                fs::remove_file(&self.target).map_err(|e| {
                    CmdGptError::AtomicWriteError(format!(
                        "failed to remove '{}' before retrying rename: {}",
                        self.target.display(),
                        e
                    ))
                })?;

                first.file.persist(&self.target).map_err(|e| {
                    CmdGptError::AtomicWriteError(format!(
                        "failed to atomically replace '{}': {}",
                        self.target.display(),
                        e.error
                    ))
                })?;
            }
        }

        sync_parent_dir(&self.target);
        Ok(())
    }

    /// Discard the pending content. The target is left untouched.
    pub fn abort(mut self) {
        self.temp = None;
    }

    fn open_temp(&mut self) -> Result<&mut BufWriter<NamedTempFile>> {
        let target = &self.target;
        self.temp.as_mut().ok_or_else(|| {
            CmdGptError::AtomicWriteError(format!(
                "writer for '{}' is already closed",
                target.display()
            ))
        })
    }
}

impl Write for AtomicFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.temp.as_mut() {
            Some(temp) => temp.write(buf),
            None => Err(io::Error::other("atomic writer is already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.temp.as_mut() {
            Some(temp) => temp.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AtomicFileWriter {
    fn drop(&mut self) {
        if self.temp.is_some() {
            // NamedTempFile removes itself when dropped.
            tracing::debug!(
                target_path = %self.target.display(),
                "discarding uncommitted atomic write"
            );
        }
    }
}

/// Atomically write bytes to a file.
///
/// # Example
///
/// ```no_run
/// use cmdgpt::fs::atomic_write;
/// use std::path::Path;
///
/// atomic_write(Path::new("state.bin"), b"\x01\x02")?;
/// # Ok::<(), cmdgpt::error::CmdGptError>(())
/// ```
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let mut writer = AtomicFileWriter::create(path)?;
    writer.write_bytes(content)?;
    writer.commit()
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around `atomic_write` for string content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Temp files are named `.{filename}.XXXXXX.tmp` so they are hidden and
/// never collide with entry or state file extensions.
fn temp_prefix(target: &Path) -> Result<String> {
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            CmdGptError::AtomicWriteError(format!("invalid file path '{}'", target.display()))
        })?;
    Ok(format!(".{}.", filename))
}

#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    // Persist the directory entry as well as the file contents.
    if let Ok(dir) = File::open(parent_dir(target)) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}
