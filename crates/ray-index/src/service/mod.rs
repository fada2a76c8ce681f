//! # Index Service
//!
//! The batch builder and the versioned store it publishes into.

mod builder;
mod store;

pub use builder::{BuildReport, IndexBuilder};
pub use store::{BaselineStore, CURRENT_FILE};
