//! # Domain Errors
//!
//! Error types for the index engine.
//!
//! Every failure surfaces to the immediate caller; nothing in this crate
//! retries. The only recoverable boundary is the audit gate, where
//! `AuditFailure` means "keep serving the previous baseline".

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in the index engine.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Disk error, fatal to the in-flight call.
    #[error("I/O failure at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Catalog input was not sorted by non-decreasing hash.
    #[error("Catalog items are not ordered: item #{index} has hash {current:#010x} after {previous:#010x}")]
    OrderingViolation {
        index: u64,
        previous: u32,
        current: u32,
    },

    /// The writer lock on a stash directory is held elsewhere.
    #[error("Directory {} is already locked{}", .path.display(), holder_suffix(.pid))]
    LockContention { path: PathBuf, pid: Option<u32> },

    /// A stash entry could not be decoded.
    #[error("Corrupt entry {}: {message}", .path.display())]
    DeserializationFailure { path: PathBuf, message: String },

    /// The candidate baseline was rejected by one or more auditors.
    #[error("Audit failed with {} problem(s): {}", .diagnostics.len(), .diagnostics.join("; "))]
    AuditFailure { diagnostics: Vec<String> },

    /// `copy_to` was given a stash of a different concrete kind.
    #[error("Can copy only to a stash of the same kind, got {kind}")]
    UnsupportedTarget { kind: &'static str },

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A baseline directory is unreadable or inconsistent.
    #[error("Corrupt baseline at {}: {message}", .path.display())]
    CorruptBaseline { path: PathBuf, message: String },

    /// Rollback was requested but no older baseline is retained.
    #[error("No baseline older than version {current} is retained")]
    NoPreviousBaseline { current: u64 },

    /// A notice that could never be indexed was offered to a stash.
    #[error("Notice {notice} cannot be indexed: {reason}")]
    InvalidNotice { notice: String, reason: String },

    /// A mutating call was made on a store opened read-only.
    #[error("Baseline store {} is open read-only", .path.display())]
    ReadOnlyStore { path: PathBuf },
}

/// Notice encoding or decoding failed.
#[derive(Debug, Clone, Error)]
#[error("Serialization error: {message}")]
pub struct SerializationError {
    pub message: String,
}

fn holder_suffix(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" by process {}", pid),
        None => String::new(),
    }
}

impl IndexError {
    /// Build an `Io` error for `path`.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Closure form of [`IndexError::io`] for `map_err`.
    pub fn at(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| IndexError::Io { path, source }
    }

    pub fn corrupt_baseline(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        IndexError::CorruptBaseline {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_violation_display() {
        let err = IndexError::OrderingViolation {
            index: 3,
            previous: 0xFF,
            current: 0x01,
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("0x000000ff"));
    }

    #[test]
    fn test_lock_contention_mentions_holder() {
        let err = IndexError::LockContention {
            path: PathBuf::from("/data/stash/LOCK"),
            pid: Some(42),
        };
        assert!(err.to_string().contains("by process 42"));

        let err = IndexError::LockContention {
            path: PathBuf::from("/data/stash/LOCK"),
            pid: None,
        };
        assert!(err.to_string().ends_with("already locked"));
    }

    #[test]
    fn test_audit_failure_joins_diagnostics() {
        let err = IndexError::AuditFailure {
            diagnostics: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 problem(s)"));
        assert!(msg.contains("a; b"));
    }

    #[test]
    fn test_io_helper_keeps_path() {
        let err = IndexError::at("/tmp/x")(io::Error::new(io::ErrorKind::Other, "boom"));
        match err {
            IndexError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("/tmp/x"));
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("Expected Io, got {:?}", other),
        }
    }
}
