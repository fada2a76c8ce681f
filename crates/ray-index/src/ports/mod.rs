//! # Ports
//!
//! Trait seams between the builder and its storage.

pub mod outbound;

pub use outbound::{NoticeIter, NoticeSerializer, Stash, SystemTimeSource, TimeSource};
