//! # Baseline
//!
//! The published, queryable aggregate of one catalog per indexed attribute
//! plus the data file their positions point into.
//!
//! ## Layout
//!
//! ```text
//! <version:020>/
//!   manifest.json            version, attributes, data length
//!   data.bin                 magic + posting blocks
//!   attr-<hex>.ctlg          catalog per attribute
//!   attr-<hex>-dups.ctlg     its duplicates side-file
//! ```
//!
//! Catalog file names carry the hex of the attribute name, so any attribute
//! string maps to a safe file name. A baseline is immutable once
//! [`BaselineWriter::finish`] returns.

mod posting;

pub use posting::{Posting, PostingScan, DATA_HEADER_LEN, DATA_MAGIC};

use crate::domain::catalog::{Catalog, CatalogItem, NOT_FOUND};
use crate::domain::errors::IndexError;
use crate::domain::notice::{Target, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Manifest file name inside a baseline directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Data file name inside a baseline directory.
pub const DATA_FILE: &str = "data.bin";

/// Extension of catalog files.
pub const CATALOG_EXTENSION: &str = "ctlg";

/// Path of the catalog for `attribute` inside `dir`.
pub fn catalog_path(dir: &Path, attribute: &str) -> PathBuf {
    dir.join(format!("attr-{}.{}", hex::encode(attribute), CATALOG_EXTENSION))
}

/// Description of a baseline, stored as JSON next to its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u64,
    pub created_at: Timestamp,
    pub attributes: Vec<String>,
    /// Notices folded in by the build that produced this baseline.
    pub notices: u64,
    pub data_len: u64,
}

// =============================================================================
// BASELINE
// =============================================================================

/// A read-only view over a baseline directory.
#[derive(Debug, Clone)]
pub struct Baseline {
    dir: PathBuf,
    manifest: Manifest,
    catalogs: BTreeMap<String, Catalog>,
}

impl Baseline {
    /// Open the baseline in `dir` by reading its manifest.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        let path = dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(IndexError::at(&path))?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::corrupt_baseline(&path, e.to_string()))?;
        let catalogs = manifest
            .attributes
            .iter()
            .map(|a| (a.clone(), Catalog::new(catalog_path(&dir, a))))
            .collect();
        Ok(Self {
            dir,
            manifest,
            catalogs,
        })
    }

    pub fn version(&self) -> u64 {
        self.manifest.version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// Actual size of the data file on disk.
    pub fn data_len(&self) -> Result<u64, IndexError> {
        let path = self.data_path();
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(IndexError::at(&path))
    }

    pub fn catalog(&self, attribute: &str) -> Option<&Catalog> {
        self.catalogs.get(attribute)
    }

    /// Catalogs keyed by attribute name.
    pub fn catalogs(&self) -> &BTreeMap<String, Catalog> {
        &self.catalogs
    }

    /// Position of the posting block for `value`, or [`NOT_FOUND`].
    pub fn seek(&self, attribute: &str, value: &str) -> Result<u64, IndexError> {
        match self.catalogs.get(attribute) {
            Some(catalog) => catalog.seek(value),
            None => Ok(NOT_FOUND),
        }
    }

    /// Read the posting block at `position`.
    pub fn posting(&self, position: u64) -> Result<Posting, IndexError> {
        let path = self.data_path();
        let mut file = File::open(&path).map_err(IndexError::at(&path))?;
        let data_len = file.metadata().map_err(IndexError::at(&path))?.len();
        Posting::read_at(&mut file, position, data_len).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                IndexError::corrupt_baseline(&path, format!("posting at {}: {}", position, e))
            }
            _ => IndexError::io(&path, e),
        })
    }

    /// Every target currently holding `value` for `attribute`.
    pub fn targets(&self, attribute: &str, value: &str) -> Result<Vec<Target>, IndexError> {
        let position = self.seek(attribute, value)?;
        if position == NOT_FOUND {
            return Ok(Vec::new());
        }
        let posting = self.posting(position)?;
        if posting.attribute != attribute || posting.value != value {
            return Err(IndexError::corrupt_baseline(
                self.data_path(),
                format!(
                    "catalog for '{}' points {} at a posting of '{}'='{}'",
                    attribute, position, posting.attribute, posting.value
                ),
            ));
        }
        Ok(posting.targets)
    }

    /// Scan every posting block of the data file in order.
    pub fn postings(&self) -> Result<PostingScan<File>, IndexError> {
        let path = self.data_path();
        let file = File::open(&path).map_err(IndexError::at(&path))?;
        let data_len = file.metadata().map_err(IndexError::at(&path))?.len();
        PostingScan::new(file, data_len)
            .map_err(|e| IndexError::corrupt_baseline(&path, e.to_string()))
    }
}

// =============================================================================
// BASELINE WRITER
// =============================================================================

/// Writes a new baseline directory: postings first, then catalogs and
/// manifest in [`finish`](BaselineWriter::finish).
pub struct BaselineWriter {
    dir: PathBuf,
    data: BufWriter<File>,
    position: u64,
    items: BTreeMap<String, Vec<CatalogItem>>,
}

impl BaselineWriter {
    /// Create `dir` and its data file.
    ///
    /// Catalogs are only ever written into a fresh directory, so readers of a
    /// published baseline never see one being replaced.
    ///
    /// # Errors
    ///
    /// `Io` with kind `AlreadyExists` if `dir` already holds a data file.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(IndexError::at(&dir))?;
        let path = dir.join(DATA_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(IndexError::at(&path))?;
        let mut data = BufWriter::new(file);
        data.write_all(DATA_MAGIC).map_err(IndexError::at(&path))?;
        Ok(Self {
            dir,
            data,
            position: DATA_HEADER_LEN,
            items: BTreeMap::new(),
        })
    }

    /// Append a posting block and return its position.
    pub fn append(&mut self, posting: &Posting) -> Result<u64, IndexError> {
        let position = self.position;
        self.position += posting
            .write_to(&mut self.data)
            .map_err(IndexError::at(self.dir.join(DATA_FILE)))?;
        self.items
            .entry(posting.attribute.clone())
            .or_default()
            .push(CatalogItem::new(posting.value.clone(), position));
        Ok(position)
    }

    /// Flush the data file, write one catalog per attribute and the
    /// manifest, then open the result.
    pub fn finish(
        self,
        version: u64,
        created_at: Timestamp,
        notices: u64,
    ) -> Result<Baseline, IndexError> {
        let data_path = self.dir.join(DATA_FILE);
        let file = self
            .data
            .into_inner()
            .map_err(|e| IndexError::io(&data_path, e.into_error()))?;
        file.sync_all().map_err(IndexError::at(&data_path))?;

        let mut attributes = Vec::with_capacity(self.items.len());
        for (attribute, mut items) in self.items {
            items.sort();
            Catalog::new(catalog_path(&self.dir, &attribute)).create(items)?;
            attributes.push(attribute);
        }

        let manifest = Manifest {
            version,
            created_at,
            attributes,
            notices,
            data_len: self.position,
        };
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| IndexError::corrupt_baseline(&path, e.to_string()))?;
        fs::write(&path, bytes).map_err(IndexError::at(&path))?;

        tracing::debug!(
            "[ray-index] #finish(): baseline v{} written to {} ({} attribute(s), {} bytes of postings)",
            version,
            self.dir.display(),
            manifest.attributes.len(),
            manifest.data_len
        );
        Baseline::open(self.dir)
    }
}
