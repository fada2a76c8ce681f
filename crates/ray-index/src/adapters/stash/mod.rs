//! # Stash Adapters
//!
//! - `DirStash`: production, one file per notice under a locked directory
//! - `MemoryStash`: tests and embedding

mod dir;
mod memory;
#[cfg(test)]
mod tests;

pub use dir::{entry_key, entry_path, DirStash, EXTENSION};
pub use memory::MemoryStash;
