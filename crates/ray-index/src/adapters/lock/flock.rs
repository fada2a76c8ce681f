//! # File Lock Implementation
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on Windows).

use crate::domain::errors::IndexError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use fs2::FileExt;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors from directory locking
#[derive(Debug, Error)]
pub enum LockError {
    /// Directory or lock file could not be created
    #[error("Failed to create lock file {}: {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Directory is already locked by another holder
    #[error("Directory already locked ({})", .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },
    /// Failed to write PID to lock file
    #[error("Failed to write PID to lock file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<LockError> for IndexError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::CreateFailed { path, source } | LockError::WriteFailed { path, source } => {
                IndexError::Io { path, source }
            }
            LockError::AlreadyLocked { pid, path } => IndexError::LockContention { path, pid },
        }
    }
}

// =============================================================================
// DIRECTORY LOCK
// =============================================================================

/// Exclusive lock on a directory.
///
/// Acquired once, without waiting, and released on drop (RAII). The lock is
/// advisory and cross-process; a second acquisition from the same process
/// also fails, since flock locks belong to the open file description.
///
/// # Example
///
/// ```ignore
/// let lock = DirectoryLock::acquire(Path::new("/data/stash"))?;
/// // Lock is held until `lock` goes out of scope
/// ```
#[derive(Debug)]
pub struct DirectoryLock {
    /// The lock file handle (kept open to maintain lock)
    file: File,
    /// Directory being guarded
    dir: PathBuf,
    /// Path to the lock file
    path: PathBuf,
    /// PID of this process
    pid: u32,
}

impl DirectoryLock {
    /// Lock file name
    pub const LOCK_FILE: &'static str = "LOCK";

    /// Acquire an exclusive lock on `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `LockError::AlreadyLocked` if the lock is held elsewhere.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(dir).map_err(|source| LockError::CreateFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        let lock_path = dir.join(Self::LOCK_FILE);

        // Open without truncating so the holder's PID survives a failed attempt
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| LockError::CreateFailed {
                path: lock_path.clone(),
                source,
            })?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            return Err(lock_failure(e, lock_path));
        }

        let pid = std::process::id();
        let write_pid = |file: &mut File| -> io::Result<()> {
            file.set_len(0)?;
            writeln!(file, "{}", pid)?;
            file.sync_all()
        };
        write_pid(&mut file).map_err(|source| LockError::WriteFailed {
            path: lock_path.clone(),
            source,
        })?;

        tracing::debug!("[ray-index] locked {} (pid {})", dir.display(), pid);
        Ok(Self {
            file,
            dir: dir.to_path_buf(),
            path: lock_path,
            pid,
        })
    }

    /// Release the lock now instead of at drop.
    pub fn release(self) -> io::Result<()> {
        FileExt::unlock(&self.file)
    }

    /// Get the PID of the process holding the lock
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The guarded directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read PID from existing lock file (for error messages)
    fn read_existing_pid(path: &Path) -> Option<u32> {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Only a held lock is contention; any other failure is an I/O error.
pub(super) fn lock_failure(err: io::Error, lock_path: PathBuf) -> LockError {
    let contended = fs2::lock_contended_error();
    let is_contention = match (err.raw_os_error(), contended.raw_os_error()) {
        (Some(code), Some(expected)) => code == expected,
        _ => err.kind() == contended.kind(),
    };
    if is_contention {
        LockError::AlreadyLocked {
            pid: DirectoryLock::read_existing_pid(&lock_path),
            path: lock_path,
        }
    } else {
        LockError::CreateFailed {
            path: lock_path,
            source: err,
        }
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        // The lock file stays: deleting it would let a waiter lock a new inode
        // while another process still holds the old one.
        let _ = FileExt::unlock(&self.file);
    }
}
