use std::collections::HashMap;
use std::fmt;

use arbor_core::Object;
use parking_lot::RwLock;
use tracing::debug;

use crate::archiver::Archiver;
use crate::error::ArchiveResult;

/// Keyed storage for whole-tree archives.
///
/// A store never interprets the bytes it holds. Errors are propagated,
/// never swallowed.
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` if nothing is stored under `key`.
    fn get(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous blob.
    fn put(&self, key: &str, bytes: Vec<u8>) -> ArchiveResult<()>;

    /// Returns `true` if a blob existed.
    fn delete(&self, key: &str) -> ArchiveResult<bool>;

    fn contains(&self, key: &str) -> ArchiveResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// HashMap-backed [`BlobStore`] for tests and embedding.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Total bytes across all blobs.
    pub fn total_bytes(&self) -> usize {
        self.blobs.read().values().map(Vec::len).sum()
    }
}

impl fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blobs", &self.len())
            .finish()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> ArchiveResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> ArchiveResult<()> {
        self.blobs.write().insert(key.to_owned(), bytes);
        Ok(())
    }

    fn delete(&self, key: &str) -> ArchiveResult<bool> {
        Ok(self.blobs.write().remove(key).is_some())
    }

    fn contains(&self, key: &str) -> ArchiveResult<bool> {
        Ok(self.blobs.read().contains_key(key))
    }
}

impl Archiver {
    /// Serialize the tree under `obj` into `store`, keyed by its name.
    pub fn store_object(&self, obj: &Object, store: &dyn BlobStore) -> ArchiveResult<()> {
        let bytes = self.to_bytes(obj)?;
        let key = obj.name();
        debug!(%key, len = bytes.len(), "tree stored");
        store.put(&key, bytes)
    }

    /// Restore the tree under `obj` from `store`.
    ///
    /// Returns `false` if nothing is stored under its name.
    pub fn restore_object(&self, obj: &Object, store: &dyn BlobStore) -> ArchiveResult<bool> {
        match store.get(&obj.name())? {
            Some(bytes) => {
                self.from_bytes(obj, &bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
