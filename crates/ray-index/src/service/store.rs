//! # Baseline Store
//!
//! Versioned baselines under one directory, with a pointer file naming the
//! one that serves queries:
//!
//! ```text
//! baselines/
//!   CURRENT                       "00000000000000000007\n"
//!   00000000000000000006/         retained for rollback
//!   00000000000000000007/         current
//!   00000000000000000008.candidate/   being built or audited
//! ```
//!
//! Publication is the rename of `CURRENT.tmp` over `CURRENT`, so readers
//! either see the old pointer or the new one.

use crate::adapters::lock::DirectoryLock;
use crate::domain::baseline::Baseline;
use crate::domain::errors::IndexError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the pointer file.
pub const CURRENT_FILE: &str = "CURRENT";

const CANDIDATE_SUFFIX: &str = ".candidate";

/// Directory of published baselines.
///
/// A writable store holds a [`DirectoryLock`] on its directory for its whole
/// lifetime, so builds, publications and rollbacks never interleave across
/// processes. Readers use [`BaselineStore::open_read_only`], which takes no
/// lock and refuses every mutating call.
#[derive(Debug)]
pub struct BaselineStore {
    dir: PathBuf,
    retained: usize,
    current: Option<u64>,
    lock: Option<DirectoryLock>,
}

impl BaselineStore {
    /// Open (creating if needed) and lock the store at `dir`, keeping at most
    /// `retained` published versions.
    ///
    /// # Errors
    ///
    /// `LockContention` if another writer holds the store.
    pub fn open(dir: impl Into<PathBuf>, retained: usize) -> Result<Self, IndexError> {
        if retained == 0 {
            return Err(IndexError::InvalidConfig(
                "at least one baseline must be retained".to_string(),
            ));
        }
        let dir = dir.into();
        let lock = DirectoryLock::acquire(&dir)?;
        let current = read_pointer(&dir)?;

        tracing::info!(
            "[ray-index] 📂 Opened baseline store {} (current: {})",
            dir.display(),
            current.map_or_else(|| "none".to_string(), |v| format!("v{}", v))
        );
        Ok(Self {
            dir,
            retained,
            current,
            lock: Some(lock),
        })
    }

    /// Open the store at `dir` for queries only. A missing directory reads
    /// as an empty store.
    pub fn open_read_only(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        let current = read_pointer(&dir)?;
        Ok(Self {
            dir,
            retained: 0,
            current,
            lock: None,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.lock.is_none()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retention limit; zero for a read-only store.
    pub fn retained(&self) -> usize {
        self.retained
    }

    pub fn current_version(&self) -> Option<u64> {
        self.current
    }

    /// The published baseline, if any.
    pub fn current(&self) -> Result<Option<Baseline>, IndexError> {
        self.current
            .map(|version| Baseline::open(self.version_dir(version)))
            .transpose()
    }

    /// Published versions on disk, ascending.
    pub fn versions(&self) -> Result<Vec<u64>, IndexError> {
        let mut versions = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(IndexError::io(&self.dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(IndexError::at(&self.dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() != 20 || !entry.path().is_dir() {
                continue;
            }
            if let Ok(version) = name.parse::<u64>() {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Version number for the next build.
    pub fn next_version(&self) -> Result<u64, IndexError> {
        let newest = self.versions()?.last().copied().unwrap_or(0);
        Ok(newest.max(self.current.unwrap_or(0)) + 1)
    }

    /// Empty directory to build candidate `version` in. Leftovers from an
    /// interrupted build are removed first.
    pub fn candidate(&self, version: u64) -> Result<PathBuf, IndexError> {
        self.writable()?;
        let dir = self.candidate_dir(version);
        if dir.exists() {
            tracing::warn!(
                "[ray-index] Removing leftover candidate {}",
                dir.display()
            );
            fs::remove_dir_all(&dir).map_err(IndexError::at(&dir))?;
        }
        Ok(dir)
    }

    /// Make an audited candidate the current baseline, then prune versions
    /// beyond the retention limit.
    pub fn publish(&mut self, candidate: Baseline) -> Result<Baseline, IndexError> {
        self.writable()?;
        let version = candidate.version();
        let target = self.version_dir(version);
        fs::rename(candidate.dir(), &target).map_err(IndexError::at(&target))?;

        self.write_pointer(version)?;
        self.current = Some(version);
        tracing::info!(
            "[ray-index] ✓ Published baseline v{} at {}",
            version,
            target.display()
        );

        self.prune()?;
        Baseline::open(target)
    }

    /// Remove a rejected candidate directory.
    pub fn discard(&self, candidate: &Path) -> Result<(), IndexError> {
        self.writable()?;
        if candidate.exists() {
            fs::remove_dir_all(candidate).map_err(IndexError::at(candidate))?;
        }
        tracing::warn!("[ray-index] 🗑️ Discarded candidate {}", candidate.display());
        Ok(())
    }

    /// Point `CURRENT` back at the newest retained version older than the
    /// current one. Versions newer than the restored one are deleted.
    pub fn rollback(&mut self) -> Result<Baseline, IndexError> {
        self.writable()?;
        let current = self.current.unwrap_or(0);
        let versions = self.versions()?;
        let previous = versions
            .iter()
            .copied()
            .filter(|v| *v < current)
            .max()
            .ok_or(IndexError::NoPreviousBaseline { current })?;

        let baseline = Baseline::open(self.version_dir(previous))?;
        self.write_pointer(previous)?;
        self.current = Some(previous);

        for stale in versions.into_iter().filter(|v| *v > previous) {
            let dir = self.version_dir(stale);
            fs::remove_dir_all(&dir).map_err(IndexError::at(&dir))?;
        }
        tracing::info!(
            "[ray-index] ↩️ Rolled back from v{} to v{}",
            current,
            previous
        );
        Ok(baseline)
    }

    fn writable(&self) -> Result<(), IndexError> {
        match self.lock {
            Some(_) => Ok(()),
            None => Err(IndexError::ReadOnlyStore {
                path: self.dir.clone(),
            }),
        }
    }

    fn version_dir(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{:020}", version))
    }

    fn candidate_dir(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{:020}{}", version, CANDIDATE_SUFFIX))
    }

    fn write_pointer(&self, version: u64) -> Result<(), IndexError> {
        let pointer = self.dir.join(CURRENT_FILE);
        let tmp = self.dir.join(format!("{}.tmp", CURRENT_FILE));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            writeln!(file, "{:020}", version)?;
            file.sync_all()?;
            fs::rename(&tmp, &pointer)
        };
        write().map_err(IndexError::at(&pointer))
    }

    fn prune(&self) -> Result<(), IndexError> {
        let versions = self.versions()?;
        if versions.len() <= self.retained {
            return Ok(());
        }
        let excess = versions.len() - self.retained;
        for version in versions.into_iter().take(excess) {
            if Some(version) == self.current {
                continue;
            }
            let dir = self.version_dir(version);
            fs::remove_dir_all(&dir).map_err(IndexError::at(&dir))?;
            tracing::debug!("[ray-index] Pruned baseline v{}", version);
        }
        Ok(())
    }
}

fn read_pointer(dir: &Path) -> Result<Option<u64>, IndexError> {
    let pointer = dir.join(CURRENT_FILE);
    match fs::read_to_string(&pointer) {
        Ok(text) => text.trim().parse::<u64>().map(Some).map_err(|e| {
            IndexError::corrupt_baseline(&pointer, format!("bad version pointer: {}", e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IndexError::io(&pointer, e)),
    }
}
