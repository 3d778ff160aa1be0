//! Persistent response cache.

use super::entry::CacheEntry;
use super::key::validate_key;
use crate::error::{CmdGptError, Result};
use crate::fs::atomic_write_file;
use crate::locks::{FileLock, ScopedLockFile};
use std::fs::{self, Metadata};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "json";
const LOCKS_DIR: &str = ".locks";
const MAINTENANCE_RESOURCE: &str = ".maintenance";

/// Limits applied by a [`ResponseCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Entries older than this are treated as absent.
    pub ttl: Duration,
    /// Maximum number of entries on disk.
    pub max_entries: usize,
    /// Maximum total size of all entry files.
    pub max_bytes: u64,
    /// Timeout for per-entry sidecar locks.
    pub lock_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            max_entries: 1000,
            max_bytes: 100 * 1024 * 1024,
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

/// Snapshot returned by [`ResponseCache::get_stats`].
///
/// `hits` and `misses` count this process only; `entries` and `size_bytes`
/// are read from disk and so include every process's writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub size_bytes: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Entries: {}", self.entries)?;
        writeln!(f, "Size:    {} bytes", self.size_bytes)?;
        writeln!(f, "Hits:    {}", self.hits)?;
        write!(f, "Misses:  {}", self.misses)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Usage {
    entries: usize,
    bytes: u64,
}

/// Content-addressed response cache shared by every process using `dir`.
///
/// Entries are written through [`atomic_write_file`], so a reader sees a
/// complete entry or none. Writers of one key are serialized by an exclusive
/// lock on `.locks/<key>.lck`; readers take the same lock shared.
///
/// Failures while reading or writing entries are logged and degrade to a
/// miss or a skipped write. Only malformed keys and path escapes surface as
/// errors.
#[derive(Debug)]
pub struct ResponseCache {
    dir: PathBuf,
    locks_dir: PathBuf,
    settings: CacheSettings,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Open (creating if needed) the cache rooted at `dir`.
    ///
    /// On Unix the directory is restricted to the current user (`0700`).
    pub fn open<P: AsRef<Path>>(dir: P, settings: CacheSettings) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error("create cache directory", dir, e))?;
        restrict_permissions(dir)?;

        let dir = fs::canonicalize(dir).map_err(|e| io_error("resolve cache directory", dir, e))?;
        let locks_dir = dir.join(LOCKS_DIR);
        fs::create_dir_all(&locks_dir)
            .map_err(|e| io_error("create cache lock directory", &locks_dir, e))?;

        Ok(Self {
            dir,
            locks_dir,
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// The canonical cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Path of the entry file for `key`.
    ///
    /// # Errors
    ///
    /// * `CmdGptError::CacheValidationError` - `key` is not a 64-char hex digest
    /// * `CmdGptError::SecurityViolation` - the entry resolves outside the cache directory
    pub fn entry_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let path = self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION));
        self.ensure_inside(&path)?;
        Ok(path)
    }

    fn ensure_inside(&self, path: &Path) -> Result<()> {
        let inside = match fs::canonicalize(path) {
            Ok(resolved) => resolved.starts_with(&self.dir),
            // Not written yet: the lexical parent is all there is to check.
            Err(e) if e.kind() == ErrorKind::NotFound => path.parent() == Some(self.dir.as_path()),
            Err(_) => false,
        };

        if inside {
            Ok(())
        } else {
            Err(CmdGptError::SecurityViolation(format!(
                "'{}' resolves outside the cache directory '{}'",
                path.display(),
                self.dir.display()
            )))
        }
    }

    /// Lock file for `key`. Created on first use and never deleted.
    fn lock_path(&self, key: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lck", key))
    }

    fn is_fresh(&self, metadata: &Metadata) -> bool {
        match metadata.modified() {
            Ok(modified) => match SystemTime::now().duration_since(modified) {
                Ok(age) => age < self.settings.ttl,
                // Modified in the future: treat as brand new.
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    /// Whether an unexpired entry exists for `key`.
    pub fn has_valid_cache(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        Ok(fs::metadata(&path)
            .map(|m| m.is_file() && self.is_fresh(&m))
            .unwrap_or(false))
    }

    /// Look up `key`, returning `None` on a miss.
    ///
    /// Expired, missing, unreadable and corrupt entries are all misses.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;

        let payload = if self.has_valid_cache(key)? {
            self.read_entry(key, &path)
        } else {
            None
        };

        if payload.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache miss");
        }

        Ok(payload)
    }

    fn read_entry(&self, key: &str, path: &Path) -> Option<String> {
        let _lock = match FileLock::shared(self.lock_path(key), self.settings.lock_timeout) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(key, error = %e, "cache read lock unavailable");
                return None;
            }
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                return None;
            }
        };

        match CacheEntry::from_json(&content) {
            Ok(entry) => Some(entry.payload),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store `payload` under `key`.
    ///
    /// The write is skipped when the entry-count or byte budget would be
    /// exceeded even after expired entries are removed, or when the entry is
    /// locked past the lock timeout. Skips are logged, never returned.
    pub fn put(&self, key: &str, payload: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        if let Err(e) = self.store(key, &path, payload) {
            warn!(key, error = %e, "cache write skipped");
        }
        Ok(())
    }

    fn store(&self, key: &str, path: &Path, payload: &str) -> Result<()> {
        let json = CacheEntry::new(payload).to_json()?;
        let size = json.len() as u64;

        if !self.fits(path, size)? {
            let removed = self.clean_expired_now();
            if !self.fits(path, size)? {
                info!(key, removed, "cache budget exhausted, write skipped");
                return Ok(());
            }
        }

        let _lock = FileLock::exclusive(self.lock_path(key), self.settings.lock_timeout)?;
        atomic_write_file(path, &json)?;
        debug!(key, bytes = size, "cache entry written");
        Ok(())
    }

    /// Whether writing `size` bytes to `path` stays within both budgets.
    /// Overwriting an existing entry adds no entry and replaces its bytes.
    fn fits(&self, path: &Path, size: u64) -> Result<bool> {
        let usage = self.usage()?;
        let existing = fs::metadata(path)
            .ok()
            .filter(Metadata::is_file)
            .map(|m| m.len());

        let entries = usage.entries + usize::from(existing.is_none());
        let bytes = usage.bytes.saturating_sub(existing.unwrap_or(0)) + size;

        Ok(entries <= self.settings.max_entries && bytes <= self.settings.max_bytes)
    }

    fn entry_files(&self) -> Result<Vec<(PathBuf, Metadata)>> {
        let dir_entries =
            fs::read_dir(&self.dir).map_err(|e| io_error("read cache directory", &self.dir, e))?;

        let mut files = Vec::new();
        for entry in dir_entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // Entries can vanish under a concurrent clear
            if let Ok(metadata) = entry.metadata()
                && metadata.is_file()
            {
                files.push((path, metadata));
            }
        }
        Ok(files)
    }

    fn usage(&self) -> Result<Usage> {
        Ok(self
            .entry_files()?
            .iter()
            .fold(Usage::default(), |usage, (_, metadata)| Usage {
                entries: usage.entries + 1,
                bytes: usage.bytes + metadata.len(),
            }))
    }

    /// Remove every expired entry. Returns the number removed.
    ///
    /// Waits up to the lock timeout for another process's maintenance to
    /// finish, then skips.
    pub fn clean_expired(&self) -> usize {
        self.remove_entries("clean", Some(self.settings.lock_timeout), |metadata| {
            !self.is_fresh(metadata)
        })
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        self.remove_entries("clear", Some(self.settings.lock_timeout), |_| true)
    }

    /// Remove expired entries unless maintenance is already running.
    fn clean_expired_now(&self) -> usize {
        self.remove_entries("clean", None, |metadata| !self.is_fresh(metadata))
    }

    /// Remove matching entries under the maintenance marker. `wait` of `None`
    /// makes a single attempt at the marker.
    fn remove_entries(
        &self,
        action: &str,
        wait: Option<Duration>,
        should_remove: impl Fn(&Metadata) -> bool,
    ) -> usize {
        let resource = self.dir.join(MAINTENANCE_RESOURCE);
        let marker = match wait {
            Some(timeout) => ScopedLockFile::acquire(&resource, timeout).map(Some),
            None => ScopedLockFile::try_acquire(&resource),
        };
        let marker = match marker {
            Ok(Some(marker)) => marker,
            Ok(None) => {
                warn!(action, "cache maintenance already in progress, skipped");
                return 0;
            }
            Err(e @ CmdGptError::LockTimeout(_)) => {
                warn!(action, error = %e, "cache maintenance already in progress, skipped");
                return 0;
            }
            Err(e) => {
                warn!(action, error = %e, "cache maintenance marker unavailable");
                return 0;
            }
        };

        let files = match self.entry_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(action, error = %e, "cache maintenance failed");
                return 0;
            }
        };

        let mut removed = 0;
        for (path, metadata) in files {
            if !should_remove(&metadata) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache entry"),
            }
        }

        if let Err(e) = marker.release() {
            warn!(action, error = %e, "failed to release maintenance marker");
        }
        info!(action, removed, "cache maintenance finished");
        removed
    }

    /// Process-local hit/miss counters plus on-disk entry count and size.
    pub fn get_stats(&self) -> CacheStats {
        let usage = self.usage().unwrap_or_else(|e| {
            warn!(error = %e, "failed to read cache usage");
            Usage::default()
        });

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: usage.entries,
            size_bytes: usage.bytes,
        }
    }
}

fn io_error(action: &str, path: &Path, e: io::Error) -> CmdGptError {
    CmdGptError::CacheIoError(format!("failed to {} '{}': {}", action, path.display(), e))
}

#[cfg(unix)]
fn restrict_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .map_err(|e| io_error("restrict permissions on", dir, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}
