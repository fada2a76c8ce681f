//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `lock`: directory locking (single writer per stash)
//! - `serializer`: notice encoding
//! - `stash`: pending-notice queues

pub mod lock;
pub mod serializer;
pub mod stash;

pub use lock::{DirectoryLock, LockError};
pub use serializer::BincodeNoticeSerializer;
pub use stash::{DirStash, MemoryStash};
