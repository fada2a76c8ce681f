//! # Directory Locking
//!
//! Keeps a single writer per stash or baseline directory across processes.

mod flock;
#[cfg(test)]
mod tests;

pub use flock::{DirectoryLock, LockError};
