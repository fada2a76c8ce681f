//! # Lock Tests

use super::*;
use crate::domain::errors::IndexError;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_lock_acquire_creates_file() {
    let dir = TempDir::new().unwrap();

    let lock = DirectoryLock::acquire(dir.path()).expect("Should acquire lock");
    assert!(lock.path().exists());
    assert_eq!(lock.dir(), dir.path());
    assert_eq!(lock.pid(), std::process::id());
}

#[test]
fn test_lock_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");

    let lock = DirectoryLock::acquire(&nested).expect("Should acquire lock");
    assert!(nested.is_dir());
    drop(lock);
}

#[test]
fn test_lock_contains_pid() {
    let dir = TempDir::new().unwrap();

    let lock = DirectoryLock::acquire(dir.path()).expect("Should acquire lock");
    let content = fs::read_to_string(lock.path()).unwrap();
    let stored_pid: u32 = content.trim().parse().unwrap();
    assert_eq!(stored_pid, std::process::id());
}

#[test]
fn test_double_lock_fails_with_holder_pid() {
    let dir = TempDir::new().unwrap();

    let _lock1 = DirectoryLock::acquire(dir.path()).expect("First lock should succeed");

    let result = DirectoryLock::acquire(dir.path());
    match result {
        Err(LockError::AlreadyLocked { pid, .. }) => {
            // The failed attempt must not have clobbered the holder's PID
            assert_eq!(pid, Some(std::process::id()));
        }
        other => panic!("Expected AlreadyLocked, got {:?}", other),
    }
}

#[test]
fn test_contention_maps_to_index_error() {
    let dir = TempDir::new().unwrap();
    let _lock1 = DirectoryLock::acquire(dir.path()).unwrap();

    let err: IndexError = DirectoryLock::acquire(dir.path()).unwrap_err().into();
    assert!(matches!(err, IndexError::LockContention { .. }));
}

#[test]
fn test_lock_released_on_drop() {
    let dir = TempDir::new().unwrap();

    {
        let _lock = DirectoryLock::acquire(dir.path()).expect("Should acquire");
    }

    let lock2 = DirectoryLock::acquire(dir.path()).expect("Should acquire after release");
    drop(lock2);
}

#[test]
fn test_explicit_release() {
    let dir = TempDir::new().unwrap();

    let lock = DirectoryLock::acquire(dir.path()).unwrap();
    lock.release().unwrap();

    assert!(DirectoryLock::acquire(dir.path()).is_ok());
}

#[test]
fn test_only_contention_maps_to_already_locked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(DirectoryLock::LOCK_FILE);

    let contended = super::flock::lock_failure(fs2::lock_contended_error(), path.clone());
    assert!(matches!(contended, LockError::AlreadyLocked { .. }));

    let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
    match super::flock::lock_failure(denied, path.clone()) {
        LockError::CreateFailed { path: failed, source } => {
            assert_eq!(failed, path);
            assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
        }
        other => panic!("Expected CreateFailed, got {:?}", other),
    }

    let err: IndexError = super::flock::lock_failure(
        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        path,
    )
    .into();
    assert!(matches!(err, IndexError::Io { .. }));
}
