//! # Ray Index Engine
//!
//! Attribute index for a messaging service: a durable queue of change
//! notices, an offline builder compiling them into immutable sorted on-disk
//! catalogs, and an audit gate every new baseline must pass before it
//! replaces the one serving queries.
//!
//! ## Data Flow
//!
//! ```text
//! producers ──add──→ Stash ──iter──→ IndexBuilder ──→ candidate Baseline
//!                      ↑                                   │
//!                      └──────remove (on publish)──────────┤ CompositeAuditor
//!                                                          ↓
//!                                  BaselineStore::publish ──→ CURRENT
//!                                                          ↓
//!                                        readers: Baseline::seek / targets
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Where |
//! |-----------|-------|
//! | Single writer per stash directory | `DirectoryLock` (fs2 flock) |
//! | Stash writes are atomic and idempotent | temp file + rename, content-addressed keys |
//! | Catalogs are sorted and never partially visible | `Catalog::create` |
//! | Nothing unaudited is ever published | `IndexBuilder::build` |
//! | A failed build keeps every notice pending | done-set updated only after publish |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - notices, catalogs, baselines, auditors, config, errors
//! - `ports/` - `Stash`, `NoticeSerializer`, `TimeSource`
//! - `adapters/` - directory lock, bincode serializer, stash implementations
//! - `service/` - `IndexBuilder` and `BaselineStore`
//!
//! ## Usage
//!
//! ```ignore
//! use ray_index::{DirStash, IndexBuilder, IndexConfig, Notice, Stash};
//!
//! let config = IndexConfig::new("/var/lib/ray");
//! let stash = DirStash::open(&config.stash_dir())?;
//! stash.add(&Notice::new(42, now).with("bout", "7"))?;
//!
//! let mut builder = IndexBuilder::from_config(&config)?;
//! builder.build(&stash)?;
//!
//! let baseline = builder.store().current()?.unwrap();
//! assert_eq!(baseline.targets("bout", "7")?, vec![42]);
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export key types for convenience
pub use adapters::{BincodeNoticeSerializer, DirStash, DirectoryLock, LockError, MemoryStash};
pub use domain::audit::{
    AuditOptions, AuditReport, Auditor, CompositeAuditor, NumbersAuditor, ReversiveAuditor,
};
pub use domain::baseline::{Baseline, BaselineWriter, Manifest, Posting};
pub use domain::catalog::{value_hash, Catalog, CatalogItem, CatalogRecord, NOT_FOUND};
pub use domain::config::IndexConfig;
pub use domain::errors::{IndexError, SerializationError};
pub use domain::notice::{Notice, Target, Timestamp};
pub use ports::{NoticeIter, NoticeSerializer, Stash, SystemTimeSource, TimeSource};
pub use service::{BaselineStore, BuildReport, IndexBuilder};
