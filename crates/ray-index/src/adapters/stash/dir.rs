//! # Directory Stash
//!
//! Pending notices as one file each, sharded by content hash:
//!
//! ```text
//! <dir>/LOCK
//! <dir>/3f/a9/0c4e…d2.nser      key = hex(sha256(bincode(notice)))
//! ```

use crate::adapters::lock::DirectoryLock;
use crate::adapters::serializer::BincodeNoticeSerializer;
use crate::domain::errors::IndexError;
use crate::domain::notice::Notice;
use crate::ports::outbound::{NoticeIter, NoticeSerializer, Stash};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension of stash entry files.
pub const EXTENSION: &str = "nser";

/// Storage key of an encoded notice: lowercase hex SHA-256 of its bytes.
pub fn entry_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Relative path of the entry with the given key.
pub fn entry_path(key: &str) -> PathBuf {
    PathBuf::from(&key[0..2])
        .join(&key[2..4])
        .join(format!("{}.{}", &key[4..], EXTENSION))
}

/// On-disk stash guarded by a [`DirectoryLock`].
///
/// Removal only marks an entry done for this instance; the file stays, so a
/// restart sees every notice again and the builder must tolerate replays.
pub struct DirStash<S: NoticeSerializer = BincodeNoticeSerializer> {
    lock: DirectoryLock,
    serializer: S,
    done: Mutex<HashSet<PathBuf>>,
}

impl DirStash<BincodeNoticeSerializer> {
    /// Open (creating if needed) the stash at `dir` and lock it.
    ///
    /// # Errors
    ///
    /// `LockContention` if another instance holds the directory.
    pub fn open(dir: &Path) -> Result<Self, IndexError> {
        Self::with_serializer(dir, BincodeNoticeSerializer)
    }

    /// Count entry files under `dir` without taking its lock. Done marks
    /// live in the owner's memory, so every file counts. A missing directory
    /// counts as empty.
    pub fn count_entries(dir: &Path) -> Result<usize, IndexError> {
        if !dir.exists() {
            return Ok(0);
        }
        Ok(entry_files(dir)?.len())
    }
}

impl<S: NoticeSerializer> DirStash<S> {
    pub fn with_serializer(dir: &Path, serializer: S) -> Result<Self, IndexError> {
        let lock = DirectoryLock::acquire(dir)?;
        let stash = Self {
            lock,
            serializer,
            done: Mutex::new(HashSet::new()),
        };
        tracing::info!("[ray-index] 📥 Opened stash: {}", stash);
        Ok(stash)
    }

    pub fn dir(&self) -> &Path {
        self.lock.dir()
    }

    /// Number of entries marked done by this instance.
    pub fn done_count(&self) -> usize {
        self.done.lock().len()
    }

    /// Release the directory lock.
    pub fn close(self) -> Result<(), IndexError> {
        tracing::info!("[ray-index] Closing stash: {}", self);
        let dir = self.dir().to_path_buf();
        self.lock.release().map_err(IndexError::at(dir))
    }

    fn all_files(&self) -> Result<Vec<PathBuf>, IndexError> {
        entry_files(self.dir())
    }

    /// Snapshot of not-done entry files.
    fn pending_files(&self) -> Result<Vec<PathBuf>, IndexError> {
        let files = self.all_files()?;
        let done = self.done.lock();
        Ok(files.into_iter().filter(|f| !done.contains(f)).collect())
    }

    fn locate(&self, notice: &Notice) -> Result<(PathBuf, Vec<u8>), IndexError> {
        let bytes = self.serializer.serialize(notice).map_err(|e| {
            IndexError::io(self.dir(), io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        let path = self.dir().join(entry_path(&entry_key(&bytes)));
        Ok((path, bytes))
    }

    fn read_entry(&self, path: &Path) -> Result<Notice, IndexError> {
        let bytes = fs::read(path).map_err(IndexError::at(path))?;
        let notice = self.serializer.deserialize(&bytes).map_err(|e| {
            IndexError::DeserializationFailure {
                path: path.to_path_buf(),
                message: e.message,
            }
        })?;
        tracing::debug!("[ray-index] Next notice {} from {}", notice, path.display());
        Ok(notice)
    }
}

/// Every entry file under `dir`, done or not, in path order.
fn entry_files(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(3).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf());
            IndexError::io(path, io::Error::from(e))
        })?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Write `bytes` to a temp sibling of `path`, then rename over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    match result.and_then(|()| fs::rename(&tmp, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

impl<S: NoticeSerializer> Stash for DirStash<S> {
    fn add(&self, notice: &Notice) -> Result<(), IndexError> {
        notice.validate()?;
        let (path, bytes) = self.locate(notice)?;
        write_atomic(&path, &bytes).map_err(IndexError::at(&path))?;
        self.done.lock().remove(&path);
        tracing::debug!("[ray-index] Added notice {} as {}", notice, path.display());
        Ok(())
    }

    fn remove(&self, notice: &Notice) -> Result<(), IndexError> {
        let (path, _) = self.locate(notice)?;
        tracing::debug!("[ray-index] Marked done {}", path.display());
        self.done.lock().insert(path);
        Ok(())
    }

    fn iter(&self) -> Result<NoticeIter<'_>, IndexError> {
        let files = self.pending_files()?;
        Ok(Box::new(files.into_iter().map(move |path| self.read_entry(&path))))
    }

    fn copy_to(&self, target: &dyn Stash) -> Result<usize, IndexError> {
        let other = target
            .as_any()
            .downcast_ref::<DirStash<S>>()
            .ok_or(IndexError::UnsupportedTarget {
                kind: target.kind(),
            })?;

        let files = self.pending_files()?;
        for source in &files {
            let relative = source.strip_prefix(self.dir()).unwrap_or(source);
            let dest = other.dir().join(relative);
            let bytes = fs::read(source).map_err(IndexError::at(source))?;
            write_atomic(&dest, &bytes).map_err(IndexError::at(&dest))?;
            other.done.lock().remove(&dest);
        }
        self.done.lock().clear();

        tracing::info!(
            "[ray-index] 📤 Copied {} notice(s) from {} to {}",
            files.len(),
            self.dir().display(),
            other.dir().display()
        );
        Ok(files.len())
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.pending_files()?.len())
    }

    fn kind(&self) -> &'static str {
        "dir"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: NoticeSerializer> fmt::Display for DirStash<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files = self.all_files().map(|files| files.len()).unwrap_or(0);
        write!(
            f,
            "{} files in {}, {} of them are done",
            files,
            self.dir().display(),
            self.done_count()
        )
    }
}

impl<S: NoticeSerializer> fmt::Debug for DirStash<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirStash")
            .field("dir", &self.dir())
            .field("done", &self.done_count())
            .finish()
    }
}
