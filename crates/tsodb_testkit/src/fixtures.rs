//! Test fixtures and store helpers.
//!
//! Provides object stores over memory or temporary files, a few sample
//! object types, and a backing store whose reads and writes can be made to
//! fail.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tsodb_core::{AccessMode, AppId, ManagedObject, ObjectRef, ObjectStore, StoreConfig};
use tsodb_storage::{
    AppNamespace, BackingStore, FileBackend, InMemoryBackend, ObjectKey, StorageError,
    StorageResult, WriteBatch,
};

/// Application ID used by every fixture.
pub const TEST_APP: AppId = AppId::new(1);

/// A numeric counter object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Current value.
    pub value: u64,
}

impl Counter {
    /// Creates a counter.
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl ManagedObject for Counter {
    const TYPE_TAG: &'static str = "testkit.Counter";
}

/// A text object that can link to other notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Body text.
    pub text: String,
    /// Linked notes.
    pub links: Vec<ObjectRef<Note>>,
}

impl Note {
    /// Creates a note without links.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
        }
    }
}

impl ManagedObject for Note {
    const TYPE_TAG: &'static str = "testkit.Note";
}

/// A test object store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: ObjectStore,
    /// Backing file, for file-based stores.
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store over a fresh in-memory backend.
    pub fn memory() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// Creates a store over a file in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("objects.tsodb");
        let backend = FileBackend::open_with_create_dirs(&path).expect("Failed to open file backend");
        Self {
            store: ObjectStore::open(TEST_APP, Arc::new(backend), StoreConfig::default()),
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a store over `backend`.
    pub fn with_backend(backend: Arc<dyn BackingStore>) -> Self {
        Self {
            store: ObjectStore::open(TEST_APP, backend, StoreConfig::default().sync_on_commit(false)),
            path: None,
            _temp_dir: None,
        }
    }

    /// Returns the backing file path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the store and opens it again from its file.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            path,
            _temp_dir,
        } = self;
        let path = path.expect("Only file-based stores can be reopened");
        drop(store);
        let backend = FileBackend::open(&path).expect("Failed to reopen file backend");
        Self {
            store: ObjectStore::open(TEST_APP, Arc::new(backend), StoreConfig::default()),
            path: Some(path),
            _temp_dir,
        }
    }

    /// Creates and commits one object.
    pub fn create<T: ManagedObject>(&self, value: T) -> ObjectRef<T> {
        self.store
            .transaction(|txn| txn.create(value))
            .expect("Failed to create object")
    }

    /// Reads the committed value of an object.
    pub fn peek<T: ManagedObject>(&self, reference: ObjectRef<T>) -> T {
        let mut txn = self
            .store
            .new_transaction(TEST_APP)
            .expect("Failed to begin transaction");
        txn.lookup(reference, AccessMode::Peek)
            .expect("Failed to peek object")
    }
}

impl std::ops::Deref for TestStore {
    type Target = ObjectStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&ObjectStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store
        .path()
        .expect("File store should have a path")
        .to_path_buf();
    f(&test_store.store, &path)
}

/// In-memory backing store with injectable read and write failures.
#[derive(Debug, Default)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    failing_writes: AtomicBool,
    failing_reads: AtomicBool,
    failed_writes: AtomicU64,
    failed_reads: AtomicU64,
}

impl FaultyBackend {
    /// Creates a backend that works until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `apply`, `clear` and `sync` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Makes every following `read`, `contains`, `count` and `keys` fail
    /// (or succeed again).
    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of writes refused so far.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// Number of reads refused so far.
    pub fn failed_reads(&self) -> u64 {
        self.failed_reads.load(Ordering::SeqCst)
    }

    /// Stores raw bytes under `key`, bypassing the object record format.
    pub fn put_raw(&self, app: AppNamespace, key: ObjectKey, bytes: Vec<u8>) {
        let mut batch = WriteBatch::new();
        batch.put(key, bytes);
        self.inner
            .apply(app, &batch)
            .expect("Failed to store raw bytes");
    }

    fn check_write(&self) -> StorageResult<()> {
        injected(&self.failing_writes, &self.failed_writes, "injected write failure")
    }

    fn check_read(&self) -> StorageResult<()> {
        injected(&self.failing_reads, &self.failed_reads, "injected read failure")
    }
}

fn injected(failing: &AtomicBool, failures: &AtomicU64, message: &str) -> StorageResult<()> {
    if failing.load(Ordering::SeqCst) {
        failures.fetch_add(1, Ordering::SeqCst);
        return Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            message.to_string(),
        )));
    }
    Ok(())
}

impl BackingStore for FaultyBackend {
    fn read(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<Option<Vec<u8>>> {
        self.check_read()?;
        self.inner.read(app, key)
    }

    fn contains(&self, app: AppNamespace, key: &ObjectKey) -> StorageResult<bool> {
        self.check_read()?;
        self.inner.contains(app, key)
    }

    fn apply(&self, app: AppNamespace, batch: &WriteBatch) -> StorageResult<()> {
        self.check_write()?;
        self.inner.apply(app, batch)
    }

    fn clear(&self, app: AppNamespace) -> StorageResult<usize> {
        self.check_write()?;
        self.inner.clear(app)
    }

    fn count(&self, app: AppNamespace) -> StorageResult<usize> {
        self.check_read()?;
        self.inner.count(app)
    }

    fn keys(&self, app: AppNamespace) -> StorageResult<Vec<ObjectKey>> {
        self.check_read()?;
        self.inner.keys(app)
    }

    fn sync(&self) -> StorageResult<()> {
        self.check_write()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `count` counters, all zero.
    pub fn counters(count: usize) -> (TestStore, Vec<ObjectRef<Counter>>) {
        let test_store = TestStore::memory();
        let refs = test_store
            .transaction(|txn| (0..count).map(|_| txn.create(Counter::new(0))).collect())
            .expect("Failed to create counters");
        (test_store, refs)
    }

    /// Creates a chain of linked notes, first to last.
    pub fn note_chain(len: usize) -> (TestStore, Vec<ObjectRef<Note>>) {
        let test_store = TestStore::memory();
        let mut refs: Vec<ObjectRef<Note>> = Vec::with_capacity(len);
        for i in 0..len {
            let mut note = Note::new(format!("note {i}"));
            note.links.extend(refs.last().copied());
            refs.push(test_store.create(note));
        }
        (test_store, refs)
    }
}
