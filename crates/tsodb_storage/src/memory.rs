//! In-memory backing store.

use crate::backend::{AppNamespace, BackingStore, ObjectKey};
use crate::batch::{BatchOp, WriteBatch};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::HashMap;

type Namespace = HashMap<ObjectKey, Vec<u8>>;

/// An in-memory backing store.
///
/// This backend keeps all committed records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral game worlds that don't need persistence
///
/// # Thread Safety
///
/// A single `RwLock` guards every namespace. Readers never observe half of a
/// batch because `apply` holds the write lock for the whole batch.
///
/// # Example
///
/// ```rust
/// use tsodb_storage::{BackingStore, InMemoryBackend, WriteBatch};
///
/// let backend = InMemoryBackend::new();
/// let mut batch = WriteBatch::new();
/// batch.put([1; 16], b"test data".to_vec());
/// backend.apply(7, &batch).unwrap();
/// assert_eq!(backend.count(7).unwrap(), 1);
/// assert_eq!(backend.count(8).unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    spaces: RwLock<HashMap<AppNamespace, Namespace>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of keys across all namespaces.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.spaces.read().values().map(HashMap::len).sum()
    }

    /// Returns every namespace that holds at least one key.
    #[must_use]
    pub fn namespaces(&self) -> Vec<AppNamespace> {
        let mut apps: Vec<_> = self
            .spaces
            .read()
            .iter()
            .filter(|(_, space)| !space.is_empty())
            .map(|(app, _)| *app)
            .collect();
        apps.sort_unstable();
        apps
    }

    /// Returns a copy of one namespace, for snapshotting and compaction.
    pub(crate) fn snapshot(&self, app: AppNamespace) -> Vec<(ObjectKey, Vec<u8>)> {
        let spaces = self.spaces.read();
        let mut entries: Vec<_> = spaces
            .get(&app)
            .map(|space| space.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub(crate) fn apply_in_memory(&self, app: AppNamespace, batch: &WriteBatch) {
        let mut spaces = self.spaces.write();
        let space = spaces.entry(app).or_default();
        for (key, op) in batch.iter() {
            match op {
                BatchOp::Put(bytes) => {
                    space.insert(*key, bytes.clone());
                }
                BatchOp::Delete => {
                    space.remove(key);
                }
            }
        }
    }

    pub(crate) fn clear_in_memory(&self, app: AppNamespace) -> usize {
        self.spaces
            .write()
            .remove(&app)
            .map(|space| space.len())
            .unwrap_or(0)
    }
}

impl BackingStore for InMemoryBackend {
    fn read(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .spaces
            .read()
            .get(&app)
            .and_then(|space| space.get(key))
            .cloned())
    }

    fn contains(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<bool> {
        Ok(self
            .spaces
            .read()
            .get(&app)
            .is_some_and(|space| space.contains_key(key)))
    }

    fn apply(&self, app: AppNamespace, batch: &WriteBatch) -> StorageResult<()> {
        self.apply_in_memory(app, batch);
        Ok(())
    }

    fn clear(&self, app: AppNamespace) -> StorageResult<usize> {
        Ok(self.clear_in_memory(app))
    }

    fn count(&self, app: AppNamespace) -> StorageResult<usize> {
        Ok(self.spaces.read().get(&app).map_or(0, HashMap::len))
    }

    fn keys(&self, app: AppNamespace) -> StorageResult<Vec<ObjectKey>> {
        let mut keys: Vec<_> = self
            .spaces
            .read()
            .get(&app)
            .map(|space| space.keys().copied().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        Ok(keys)
    }

    fn sync(&self) -> StorageResult<()> {
        // Nothing to make durable
        Ok(())
    }
}
