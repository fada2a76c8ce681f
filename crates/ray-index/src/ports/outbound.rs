//! # Outbound Ports (Driven Ports)
//!
//! Interfaces the builder depends on, with their default implementations
//! living in `adapters/`.

use crate::domain::errors::{IndexError, SerializationError};
use crate::domain::notice::{Notice, Timestamp};
use std::any::Any;

/// Lazy, one-shot sequence of stash entries.
pub type NoticeIter<'a> = Box<dyn Iterator<Item = Result<Notice, IndexError>> + 'a>;

/// Durable, unordered set of notices awaiting indexing.
///
/// Production: `DirStash` (sharded files under a locked directory)
/// Testing: `MemoryStash`
pub trait Stash: Send + Sync {
    /// Persist `notice`. Adding identical content again is a no-op rewrite.
    fn add(&self, notice: &Notice) -> Result<(), IndexError>;

    /// Mark `notice` as done for this instance. Nothing is deleted, and the
    /// marking does not survive a restart.
    fn remove(&self, notice: &Notice) -> Result<(), IndexError>;

    /// Iterate over a snapshot of not-done entries taken now.
    ///
    /// Adding or removing while iterating leaves the snapshot unchanged;
    /// a corrupt entry yields `DeserializationFailure`.
    fn iter(&self) -> Result<NoticeIter<'_>, IndexError>;

    /// Copy every not-done entry into `target` and clear the done-set.
    ///
    /// Returns the number of entries copied. Fails with `UnsupportedTarget`
    /// unless `target` is the same concrete kind.
    fn copy_to(&self, target: &dyn Stash) -> Result<usize, IndexError>;

    /// Number of not-done entries.
    fn len(&self) -> Result<usize, IndexError>;

    fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Concrete kind, used in `UnsupportedTarget`.
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

/// Byte encoding of notices inside a stash.
///
/// Must round-trip exactly and be deterministic: equal notices encode to
/// equal bytes.
pub trait NoticeSerializer: Send + Sync + 'static {
    fn serialize(&self, notice: &Notice) -> Result<Vec<u8>, SerializationError>;

    fn deserialize(&self, data: &[u8]) -> Result<Notice, SerializationError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
