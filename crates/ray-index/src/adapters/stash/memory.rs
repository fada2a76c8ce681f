use crate::adapters::serializer::BincodeNoticeSerializer;
use crate::adapters::stash::dir::entry_key;
use crate::domain::errors::IndexError;
use crate::domain::notice::Notice;
use crate::ports::outbound::{NoticeIter, NoticeSerializer, Stash};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::PathBuf;

/// In-memory stash for tests and embedding.
///
/// Same keying and done-set semantics as `DirStash`, without persistence or
/// locking.
#[derive(Default)]
pub struct MemoryStash<S: NoticeSerializer = BincodeNoticeSerializer> {
    serializer: S,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    done: Mutex<HashSet<String>>,
}

impl MemoryStash<BincodeNoticeSerializer> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: NoticeSerializer> MemoryStash<S> {
    pub fn with_serializer(serializer: S) -> Self {
        Self {
            serializer,
            entries: Mutex::new(BTreeMap::new()),
            done: Mutex::new(HashSet::new()),
        }
    }

    /// Store raw bytes under `key`, bypassing the serializer.
    pub fn insert_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.lock().insert(key.into(), bytes);
    }

    pub fn done_count(&self) -> usize {
        self.done.lock().len()
    }

    fn key(&self, notice: &Notice) -> Result<(String, Vec<u8>), IndexError> {
        let bytes = self.serializer.serialize(notice).map_err(|e| {
            IndexError::io("<memory>", io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        Ok((entry_key(&bytes), bytes))
    }

    fn pending(&self) -> Vec<(String, Vec<u8>)> {
        let entries = self.entries.lock();
        let done = self.done.lock();
        entries
            .iter()
            .filter(|(key, _)| !done.contains(*key))
            .map(|(key, bytes)| (key.clone(), bytes.clone()))
            .collect()
    }
}

impl<S: NoticeSerializer> Stash for MemoryStash<S> {
    fn add(&self, notice: &Notice) -> Result<(), IndexError> {
        notice.validate()?;
        let (key, bytes) = self.key(notice)?;
        self.done.lock().remove(&key);
        self.entries.lock().insert(key, bytes);
        Ok(())
    }

    fn remove(&self, notice: &Notice) -> Result<(), IndexError> {
        let (key, _) = self.key(notice)?;
        self.done.lock().insert(key);
        Ok(())
    }

    fn iter(&self) -> Result<NoticeIter<'_>, IndexError> {
        let snapshot = self.pending();
        Ok(Box::new(snapshot.into_iter().map(move |(key, bytes)| {
            self.serializer
                .deserialize(&bytes)
                .map_err(|e| IndexError::DeserializationFailure {
                    path: PathBuf::from(key),
                    message: e.message,
                })
        })))
    }

    fn copy_to(&self, target: &dyn Stash) -> Result<usize, IndexError> {
        let other = target
            .as_any()
            .downcast_ref::<MemoryStash<S>>()
            .ok_or(IndexError::UnsupportedTarget {
                kind: target.kind(),
            })?;

        let snapshot = self.pending();
        let copied = snapshot.len();
        for (key, bytes) in snapshot {
            other.done.lock().remove(&key);
            other.entries.lock().insert(key, bytes);
        }
        self.done.lock().clear();
        Ok(copied)
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.pending().len())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
