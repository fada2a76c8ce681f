//! # Catalog
//!
//! Immutable, binary-searchable map from an attribute value to the byte
//! position of its posting block in a baseline data file.
//!
//! ## File Format
//!
//! The primary file is a flat sequence of 12-byte records with no header:
//!
//! ```text
//! [hash:u32 BE][position:u64 BE] [hash:u32 BE][position:u64 BE] ...
//! ```
//!
//! Records are sorted by non-decreasing hash. The hash is CRC-32 of the
//! value, so two distinct values may collide. Every record whose hash occurs
//! more than once is repeated, with its full value, in the duplicates
//! side-file (`<stem>-dups.<ext>`):
//!
//! ```text
//! [hash:u32 BE][len:u32 BE][value bytes][position:u64 BE] ...
//! ```
//!
//! ## Concurrency
//!
//! `seek` is read-only and opens its own handle, so any number of readers may
//! run at once. `create` is single-writer and publishes with a rename, so a
//! reader never observes a half-written file.
//!
//! The side-file is renamed before the primary, and the two renames are not
//! one atomic step. Rebuilding a catalog in place while readers are active is
//! unsupported: a reader could pair the new side-file with the old primary.
//! Baselines avoid this by writing every catalog into a new directory.


use crate::domain::errors::IndexError;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of one primary record in bytes (u32 + u64).
pub const RECORD_SIZE: u64 = 4 + 8;

/// Position returned by [`Catalog::seek`] when the value is absent.
pub const NOT_FOUND: u64 = 0;

/// Hash a value the way catalogs order and search it.
pub fn value_hash(value: &str) -> u32 {
    crc32fast::hash(value.as_bytes())
}

// =============================================================================
// ITEMS & RECORDS
// =============================================================================

/// One value and the position of its posting block.
///
/// Ordered by hash first, then value, then position: the order `create`
/// expects its input in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    value: String,
    position: u64,
}

impl CatalogItem {
    pub fn new(value: impl Into<String>, position: u64) -> Self {
        Self {
            value: value.into(),
            position,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn hash(&self) -> u32 {
        value_hash(&self.value)
    }
}

impl Ord for CatalogItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash()
            .cmp(&other.hash())
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for CatalogItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One fixed-size record of the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogRecord {
    pub hash: u32,
    pub position: u64,
}

impl CatalogRecord {
    pub fn encode(&self) -> [u8; RECORD_SIZE as usize] {
        let mut bytes = [0u8; RECORD_SIZE as usize];
        bytes[..4].copy_from_slice(&self.hash.to_be_bytes());
        bytes[4..].copy_from_slice(&self.position.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; RECORD_SIZE as usize]) -> Self {
        let mut hash = [0u8; 4];
        let mut position = [0u8; 8];
        hash.copy_from_slice(&bytes[..4]);
        position.copy_from_slice(&bytes[4..]);
        Self {
            hash: u32::from_be_bytes(hash),
            position: u64::from_be_bytes(position),
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// A primary catalog file plus its duplicates side-file.
#[derive(Debug, Clone)]
pub struct Catalog {
    file: PathBuf,
    dups: PathBuf,
}

impl Catalog {
    /// Bind a catalog to `path`; nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let file = path.into();
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match file.extension() {
            Some(ext) => format!("{}-dups.{}", stem, ext.to_string_lossy()),
            None => format!("{}-dups", stem),
        };
        let dups = file.with_file_name(name);
        Self { file, dups }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn dups_path(&self) -> &Path {
        &self.dups
    }

    /// Size of the primary file in bytes.
    pub fn byte_len(&self) -> Result<u64, IndexError> {
        fs::metadata(&self.file)
            .map(|m| m.len())
            .map_err(IndexError::at(&self.file))
    }

    /// Number of complete records in the primary file.
    pub fn len(&self) -> Result<u64, IndexError> {
        Ok(self.byte_len()? / RECORD_SIZE)
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    /// Write the catalog from items sorted by non-decreasing hash.
    ///
    /// Returns the number of records written. Not safe for concurrent
    /// invocation on the same path.
    ///
    /// # Errors
    ///
    /// `OrderingViolation` if any item hashes lower than its predecessor; in
    /// that case nothing is published at the catalog's path.
    pub fn create<I>(&self, items: I) -> Result<u64, IndexError>
    where
        I: IntoIterator<Item = CatalogItem>,
    {
        let file_tmp = temp_path(&self.file);
        let dups_tmp = temp_path(&self.dups);
        match self.write_files(items, &file_tmp, &dups_tmp) {
            Ok(count) => {
                fs::rename(&dups_tmp, &self.dups).map_err(IndexError::at(&self.dups))?;
                fs::rename(&file_tmp, &self.file).map_err(IndexError::at(&self.file))?;
                tracing::debug!(
                    "[ray-index] #create(): {} record(s) written to {}",
                    count,
                    self.file.display()
                );
                Ok(count)
            }
            Err(e) => {
                let _ = fs::remove_file(&file_tmp);
                let _ = fs::remove_file(&dups_tmp);
                Err(e)
            }
        }
    }

    fn write_files<I>(&self, items: I, file_tmp: &Path, dups_tmp: &Path) -> Result<u64, IndexError>
    where
        I: IntoIterator<Item = CatalogItem>,
    {
        let mut data = BufWriter::new(File::create(file_tmp).map_err(IndexError::at(file_tmp))?);
        let mut dups = BufWriter::new(File::create(dups_tmp).map_err(IndexError::at(dups_tmp))?);

        // Items sharing the current hash, flushed when the hash changes.
        let mut run: Vec<(u32, CatalogItem)> = Vec::new();
        let mut count = 0u64;

        for item in items {
            let hash = item.hash();
            if let Some(previous) = run.last().map(|(h, _)| *h) {
                if hash < previous {
                    return Err(IndexError::OrderingViolation {
                        index: count + run.len() as u64,
                        previous,
                        current: hash,
                    });
                }
                if hash != previous {
                    count += flush_run(&mut run, &mut data, &mut dups)
                        .map_err(IndexError::at(file_tmp))?;
                }
            }
            run.push((hash, item));
        }
        count += flush_run(&mut run, &mut data, &mut dups).map_err(IndexError::at(file_tmp))?;

        finish(data).map_err(IndexError::at(file_tmp))?;
        finish(dups).map_err(IndexError::at(dups_tmp))?;
        Ok(count)
    }

    /// Position of `value`'s posting block, or [`NOT_FOUND`].
    ///
    /// Binary search by direct random access; the file is never loaded whole.
    pub fn seek(&self, value: &str) -> Result<u64, IndexError> {
        let target = value_hash(value);
        let mut data = File::open(&self.file).map_err(IndexError::at(&self.file))?;
        let count = data
            .metadata()
            .map_err(IndexError::at(&self.file))?
            .len()
            / RECORD_SIZE;

        // Lower bound: first record with hash >= target.
        let (mut left, mut right) = (0u64, count);
        while left < right {
            let mid = left + (right - left) / 2;
            let record = read_record(&mut data, mid).map_err(IndexError::at(&self.file))?;
            if record.hash < target {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        if left >= count {
            return Ok(NOT_FOUND);
        }
        let first = read_record(&mut data, left).map_err(IndexError::at(&self.file))?;
        if first.hash != target {
            return Ok(NOT_FOUND);
        }
        let ambiguous = left + 1 < count
            && read_record(&mut data, left + 1)
                .map_err(IndexError::at(&self.file))?
                .hash
                == target;
        if !ambiguous {
            return Ok(first.position);
        }
        self.seek_duplicate(target, value)
    }

    /// Linear scan of the duplicates file, comparing full values.
    fn seek_duplicate(&self, target: u32, value: &str) -> Result<u64, IndexError> {
        let file = File::open(&self.dups).map_err(IndexError::at(&self.dups))?;
        let mut reader = BufReader::new(file);
        while let Some((hash, stored, position)) =
            read_duplicate(&mut reader).map_err(IndexError::at(&self.dups))?
        {
            if hash > target {
                break;
            }
            if hash == target && stored == value.as_bytes() {
                return Ok(position);
            }
        }
        tracing::debug!(
            "[ray-index] #seek('{}'): hash {:#010x} collides but value is absent",
            value,
            target
        );
        Ok(NOT_FOUND)
    }

    /// Stream every complete record of the primary file in order.
    pub fn records(&self) -> Result<CatalogRecords, IndexError> {
        let file = File::open(&self.file).map_err(IndexError::at(&self.file))?;
        let remaining = file.metadata().map_err(IndexError::at(&self.file))?.len() / RECORD_SIZE;
        Ok(CatalogRecords {
            reader: BufReader::new(file),
            path: self.file.clone(),
            remaining,
        })
    }
}

/// Iterator returned by [`Catalog::records`].
pub struct CatalogRecords {
    reader: BufReader<File>,
    path: PathBuf,
    remaining: u64,
}

impl Iterator for CatalogRecords {
    type Item = Result<CatalogRecord, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let mut bytes = [0u8; RECORD_SIZE as usize];
        Some(
            self.reader
                .read_exact(&mut bytes)
                .map(|_| CatalogRecord::decode(&bytes))
                .map_err(IndexError::at(&self.path)),
        )
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn flush_run(
    run: &mut Vec<(u32, CatalogItem)>,
    data: &mut impl Write,
    dups: &mut impl Write,
) -> io::Result<u64> {
    let collided = run.len() > 1;
    let count = run.len() as u64;
    for (hash, item) in run.drain(..) {
        let record = CatalogRecord {
            hash,
            position: item.position,
        };
        data.write_all(&record.encode())?;
        if collided {
            dups.write_all(&hash.to_be_bytes())?;
            dups.write_all(&(item.value.len() as u32).to_be_bytes())?;
            dups.write_all(item.value.as_bytes())?;
            dups.write_all(&item.position.to_be_bytes())?;
        }
    }
    Ok(count)
}

fn finish(writer: BufWriter<File>) -> io::Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn read_record(file: &mut File, index: u64) -> io::Result<CatalogRecord> {
    let mut bytes = [0u8; RECORD_SIZE as usize];
    file.seek(SeekFrom::Start(index * RECORD_SIZE))?;
    file.read_exact(&mut bytes)?;
    Ok(CatalogRecord::decode(&bytes))
}

fn read_duplicate(reader: &mut BufReader<File>) -> io::Result<Option<(u32, Vec<u8>, u64)>> {
    if reader.fill_buf()?.is_empty() {
        return Ok(None);
    }
    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    let hash = u32::from_be_bytes(word);
    reader.read_exact(&mut word)?;
    let mut value = vec![0u8; u32::from_be_bytes(word) as usize];
    reader.read_exact(&mut value)?;
    let mut position = [0u8; 8];
    reader.read_exact(&mut position)?;
    Ok(Some((hash, value, u64::from_be_bytes(position))))
}
