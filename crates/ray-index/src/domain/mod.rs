//! # Domain Layer
//!
//! Types and on-disk formats of the index engine.
//!
//! ## Modules
//!
//! - `notice` - Immutable change events
//! - `catalog` - Sorted (hash, position) index files with collision side-file
//! - `baseline` - Published aggregate of catalogs plus the posting data file
//! - `audit` - Correctness checks gating publication
//! - `config` - Engine configuration
//! - `errors` - Domain error types

pub mod audit;
pub mod baseline;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod notice;
