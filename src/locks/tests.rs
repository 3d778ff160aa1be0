//! Tests for the locks subsystem.

use super::*;
use crate::error::CmdGptError;
use std::fs::{self, File};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_secs(10);

fn set_mtime(path: &std::path::Path, age: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

// ============================================================================
// FileLock
// ============================================================================

#[test]
fn test_exclusive_excludes_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let first = FileLock::exclusive(&path, SHORT).unwrap();
    assert!(first.is_locked());
    assert_eq!(first.mode(), LockMode::Exclusive);

    assert!(
        FileLock::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_shared_locks_coexist() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let _a = FileLock::shared(&path, SHORT).unwrap();
    let b = FileLock::shared(&path, SHORT).unwrap();
    assert!(b.is_locked());
}

#[test]
fn test_shared_times_out_while_exclusive_held() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let _writer = FileLock::exclusive(&path, SHORT).unwrap();
    let err = FileLock::shared(&path, SHORT).unwrap_err();

    assert!(matches!(err, CmdGptError::LockTimeout(_)));
    assert!(err.to_string().contains("shared lock"));
    assert!(err.is_retryable());
}

#[test]
fn test_exclusive_times_out_while_shared_held() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let _reader = FileLock::shared(&path, SHORT).unwrap();
    let err = FileLock::exclusive(&path, SHORT).unwrap_err();
    assert!(matches!(err, CmdGptError::LockTimeout(_)));
}

#[test]
fn test_drop_releases_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    {
        let _lock = FileLock::exclusive(&path, SHORT).unwrap();
    }

    let again = FileLock::try_acquire(&path, LockMode::Exclusive).unwrap();
    assert!(again.is_some());
}

#[test]
fn test_lock_released_on_error_path() {
    fn fails_while_locked(path: &std::path::Path) -> crate::error::Result<()> {
        let _lock = FileLock::exclusive(path, SHORT)?;
        Err(CmdGptError::UserError("boom".to_string()))
    }

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    assert!(fails_while_locked(&path).is_err());
    assert!(FileLock::exclusive(&path, SHORT).is_ok());
}

#[test]
fn test_unlock_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::exclusive(&path, SHORT).unwrap();
    lock.unlock();
    assert!(!lock.is_locked());
    lock.unlock();
    assert!(!lock.is_locked());

    // A released handle cannot be converted.
    assert!(!lock.try_lock_shared());
    assert!(FileLock::exclusive(&path, SHORT).is_ok());
}

#[test]
fn test_release_frees_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let lock = FileLock::exclusive(&path, SHORT).unwrap();
    lock.release().unwrap();
    assert!(FileLock::exclusive(&path, SHORT).is_ok());
}

#[test]
fn test_moved_lock_stays_held() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let lock = FileLock::exclusive(&path, SHORT).unwrap();
    let holder = vec![lock];
    assert!(holder[0].is_locked());
    assert!(
        FileLock::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .is_none()
    );

    drop(holder);
    assert!(FileLock::exclusive(&path, SHORT).is_ok());
}

#[test]
fn test_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a").join("b").join("state.lck");

    let lock = FileLock::exclusive(&path, SHORT).unwrap();
    assert!(path.exists());
    assert_eq!(lock.path(), path.as_path());
}

#[test]
fn test_zero_timeout_waits_for_release() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let holder = FileLock::exclusive(&path, SHORT).unwrap();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        drop(holder);
    });

    let lock = FileLock::exclusive(&path, Duration::ZERO).unwrap();
    assert!(lock.is_locked());
    releaser.join().unwrap();
}

#[test]
fn test_exclusive_holders_never_overlap() {
    let temp_dir = TempDir::new().unwrap();
    let path = Arc::new(temp_dir.path().join("counter.lck"));
    let inside = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let path = Arc::clone(&path);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            let entries = Arc::clone(&entries);
            thread::spawn(move || {
                for _ in 0..10 {
                    let _lock = FileLock::exclusive(path.as_path(), LONG).unwrap();
                    if inside.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    entries.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(1));
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(entries.load(Ordering::SeqCst), 60);
}

#[test]
fn test_try_upgrade_requires_shared_mode() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::exclusive(&path, SHORT).unwrap();
    assert!(!lock.try_upgrade());
    assert_eq!(lock.mode(), LockMode::Exclusive);
    assert!(lock.is_locked());
}

#[cfg(unix)]
#[test]
fn test_try_upgrade_sole_holder() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::shared(&path, SHORT).unwrap();
    assert!(lock.try_upgrade());
    assert_eq!(lock.mode(), LockMode::Exclusive);
    assert!(
        FileLock::try_acquire(&path, LockMode::Shared)
            .unwrap()
            .is_none()
    );
}

#[cfg(unix)]
#[test]
fn test_try_upgrade_refused_keeps_shared_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::shared(&path, SHORT).unwrap();
    let _other = FileLock::shared(&path, SHORT).unwrap();

    assert!(!lock.try_upgrade());
    assert!(lock.is_locked());
    assert_eq!(lock.mode(), LockMode::Shared);

    drop(_other);
    // Still held shared: writers are kept out, readers are not.
    assert!(
        FileLock::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .is_none()
    );
    assert!(
        FileLock::try_acquire(&path, LockMode::Shared)
            .unwrap()
            .is_some()
    );
}

#[test]
fn test_restore_wait_is_bounded() {
    use super::file_lock::{RESTORE_LIMIT, restore_limit};

    assert_eq!(restore_limit(Duration::ZERO), RESTORE_LIMIT);
    assert_eq!(restore_limit(LONG), RESTORE_LIMIT);
    assert_eq!(restore_limit(Duration::from_millis(5)), Duration::from_millis(5));
}

#[cfg(unix)]
#[test]
fn test_refused_upgrade_without_timeout_returns_promptly() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::try_acquire(&path, LockMode::Shared)
        .unwrap()
        .unwrap();
    let _other = FileLock::shared(&path, SHORT).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    let handle = thread::spawn(move || {
        let upgraded = lock.try_upgrade();
        tx.send((upgraded, lock.is_locked())).unwrap();
        lock
    });

    let (upgraded, locked) = rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert!(!upgraded);
    assert!(locked);
    let lock = handle.join().unwrap();
    assert_eq!(lock.mode(), LockMode::Shared);
}

#[cfg(unix)]
#[test]
fn test_try_lock_shared_downgrades() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::exclusive(&path, SHORT).unwrap();
    assert!(lock.try_lock_shared());
    assert_eq!(lock.mode(), LockMode::Shared);

    assert!(FileLock::shared(&path, SHORT).is_ok());
    assert!(
        FileLock::try_acquire(&path, LockMode::Exclusive)
            .unwrap()
            .is_none()
    );

    // Downgrading twice is refused.
    assert!(!lock.try_lock_shared());
}

#[cfg(windows)]
#[test]
fn test_conversions_unsupported_leave_lock_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.lck");

    let mut lock = FileLock::exclusive(&path, SHORT).unwrap();
    assert!(!lock.try_lock_shared());
    assert_eq!(lock.mode(), LockMode::Exclusive);
    assert!(lock.is_locked());
}

#[test]
fn test_sidecar_path_appends_suffix() {
    let path = std::path::Path::new("/tmp/state/api.ratelimit");
    assert_eq!(
        sidecar_path(path),
        std::path::PathBuf::from("/tmp/state/api.ratelimit.lck")
    );
}

// ============================================================================
// ScopedLockFile
// ============================================================================

#[test]
fn test_marker_path_appends_lock() {
    let resource = std::path::Path::new("/tmp/cache/.maintenance");
    assert_eq!(
        ScopedLockFile::marker_path_for(resource),
        std::path::PathBuf::from("/tmp/cache/.maintenance.lock")
    );
}

#[test]
fn test_marker_created_and_removed_on_drop() {
    let temp_dir = TempDir::new().unwrap();
    let resource = temp_dir.path().join("maint");
    let marker = ScopedLockFile::marker_path_for(&resource);

    {
        let guard = ScopedLockFile::acquire(&resource, SHORT).unwrap();
        assert_eq!(guard.path(), marker.as_path());
        assert!(marker.exists());

        let meta = MarkerMetadata::from_file(&marker);
        assert_eq!(meta.pid, Some(std::process::id()));
        assert!(meta.owner.is_some());
    }

    assert!(!marker.exists());
}

#[test]
fn test_marker_excludes_second_holder() {
    let temp_dir = TempDir::new().unwrap();
    let resource = temp_dir.path().join("maint");

    let _guard = ScopedLockFile::acquire(&resource, SHORT).unwrap();
    assert!(ScopedLockFile::try_acquire(&resource).unwrap().is_none());

    let err = ScopedLockFile::acquire(&resource, SHORT).unwrap_err();
    assert!(matches!(err, CmdGptError::LockTimeout(_)));
    assert!(err.to_string().contains(&std::process::id().to_string()));
}

#[test]
fn test_marker_release_allows_reacquire() {
    let temp_dir = TempDir::new().unwrap();
    let resource = temp_dir.path().join("maint");

    let guard = ScopedLockFile::acquire(&resource, SHORT).unwrap();
    guard.release().unwrap();

    assert!(ScopedLockFile::try_acquire(&resource).unwrap().is_some());
}

#[test]
fn test_leaked_marker_blocks_until_cleared() {
    let temp_dir = TempDir::new().unwrap();
    let resource = temp_dir.path().join("maint");
    let marker = ScopedLockFile::marker_path_for(&resource);

    // A holder that died without cleaning up.
    fs::write(&marker, "999999\nghost@elsewhere\n").unwrap();
    assert!(ScopedLockFile::try_acquire(&resource).unwrap().is_none());

    let dirs = [temp_dir.path()];
    let info = clear_marker(&dirs, "maint.lock", 120).unwrap();
    assert_eq!(info.metadata.pid, Some(999999));
    assert_eq!(info.metadata.owner.as_deref(), Some("ghost@elsewhere"));

    assert!(ScopedLockFile::try_acquire(&resource).unwrap().is_some());
}

#[test]
fn test_marker_metadata_parse_tolerates_garbage() {
    let meta = MarkerMetadata::parse("not-a-pid\n");
    assert_eq!(meta.pid, None);
    assert_eq!(meta.owner, None);
    assert_eq!(meta.describe(), "an unknown holder");

    let meta = MarkerMetadata::parse("42\nalice@box\n");
    assert_eq!(meta.pid, Some(42));
    assert_eq!(meta.describe(), "pid 42 (alice@box)");
}

// ============================================================================
// Marker listing and clearing
// ============================================================================

#[test]
fn test_list_markers_reports_stale_flag() {
    let temp_dir = TempDir::new().unwrap();
    let fresh = temp_dir.path().join("fresh.lock");
    let old = temp_dir.path().join("old.lock");
    fs::write(&fresh, "1\n").unwrap();
    fs::write(&old, "2\n").unwrap();
    fs::write(temp_dir.path().join("state.lck"), "").unwrap();
    set_mtime(&old, Duration::from_secs(3 * 3600));

    let dirs = [temp_dir.path()];
    let markers = list_markers(&dirs, 120).unwrap();

    assert_eq!(markers.len(), 2);
    let fresh_info = markers.iter().find(|m| m.name == "fresh.lock").unwrap();
    let old_info = markers.iter().find(|m| m.name == "old.lock").unwrap();
    assert!(!fresh_info.is_stale);
    assert!(old_info.is_stale);
    assert!(old_info.age_string().contains('h'));
    assert!(old_info.to_string().contains("STALE"));
}

#[test]
fn test_list_markers_skips_missing_directories() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing");
    let dirs = [missing.as_path()];

    assert!(list_markers(&dirs, 120).unwrap().is_empty());
}

#[test]
fn test_clear_marker_rejects_paths() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = [temp_dir.path()];

    for name in ["../x.lock", "a/b.lock", "..", ""] {
        let err = clear_marker(&dirs, name, 120).unwrap_err();
        assert!(matches!(err, CmdGptError::UserError(_)), "{}", name);
    }

    let err = clear_marker(&dirs, "state.lck", 120).unwrap_err();
    assert!(err.to_string().contains("not a lock marker"));
}

#[test]
fn test_clear_marker_missing() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = [temp_dir.path()];

    let err = clear_marker(&dirs, "nothing.lock", 120).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
