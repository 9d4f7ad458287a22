//! Backing store trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;

/// Application namespace. Every application owns a disjoint key space.
pub type AppNamespace = u64;

/// Opaque 16-byte object key.
pub type ObjectKey = [u8; 16];

/// The committed state of every persistent object.
///
/// Backing stores are **opaque ID-to-bytes stores**. TSODB owns all record
/// interpretation - backends do not understand versions, type tags or locks.
///
/// # Invariants
///
/// - `apply` is atomic per batch: a concurrent `read` observes either none or
///   all of a batch's effects
/// - `read` after a successful `apply` returns the applied bytes
/// - `clear` only touches the given namespace
/// - Backends must be `Send + Sync`; all methods take `&self`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait BackingStore: Send + Sync {
    /// Reads the committed bytes for `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or an I/O error occurs.
    fn read(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<Option<Vec<u8>>>;

    /// Returns true if `key` currently exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn contains(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<bool> {
        Ok(self.read(app, key)?.is_some())
    }

    /// Atomically applies every operation of `batch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable. In that case
    /// none of its operations are visible.
    fn apply(&self, app: AppNamespace, batch: &WriteBatch) -> StorageResult<()>;

    /// Removes every key of the namespace, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the wipe could not be made durable.
    fn clear(&self, app: AppNamespace) -> StorageResult<usize>;

    /// Returns the number of keys in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn count(&self, app: AppNamespace) -> StorageResult<usize>;

    /// Returns every key of the namespace, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed.
    fn keys(&self, app: AppNamespace) -> StorageResult<Vec<ObjectKey>>;

    /// Syncs all applied batches to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;
}
