//! Object store facade.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockTable;
use crate::object::{ObjectId, ObjectRecord};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::transaction::{Transaction, TxnHandle, WorkingSet};
use crate::types::{AppId, SequenceNumber, Timestamp, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tsodb_storage::{BackingStore, InMemoryBackend, WriteBatch};

/// The object store of one application.
///
/// `ObjectStore` is the entry point of TSODB. It hands out transactions,
/// each with a fresh timestamp, and owns everything they share: the lock
/// table, the registry of active transactions, and the backing store
/// namespace of the application.
///
/// Cloning is cheap; clones refer to the same store.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tsodb_core::{AccessMode, AppId, ManagedObject, ObjectStore};
///
/// #[derive(Serialize, Deserialize)]
/// struct Counter {
///     value: u64,
/// }
///
/// impl ManagedObject for Counter {
///     const TYPE_TAG: &'static str = "doc.Counter";
/// }
///
/// let app = AppId::new(7);
/// let store = ObjectStore::open_in_memory(app);
///
/// let mut txn = store.new_transaction(app)?;
/// let counter = txn.create(Counter { value: 1 })?;
/// txn.commit()?;
///
/// let mut txn = store.new_transaction(app)?;
/// txn.modify(counter, |c| c.value += 1)?;
/// txn.commit()?;
///
/// let mut txn = store.new_transaction(app)?;
/// assert_eq!(txn.lookup(counter, AccessMode::Peek)?.value, 2);
/// # Ok::<(), tsodb_core::CoreError>(())
/// ```
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<StoreInner>,
}

/// State shared by an object store and all of its transactions.
pub(crate) struct StoreInner {
    app_id: AppId,
    backend: Arc<dyn BackingStore>,
    config: StoreConfig,
    pub(crate) locks: LockTable,
    pub(crate) stats: Arc<StoreStats>,
    registry: RwLock<HashMap<TransactionId, Arc<TxnHandle>>>,
    next_txid: AtomicU64,
    clock: AtomicU64,
    // Versions only need to be unique per running store: a transaction never
    // outlives the process that began it.
    next_seq: AtomicU64,
    committed_seq: AtomicU64,
    epoch: AtomicU64,
    /// Serializes commit validation and apply against each other and `clear_all`.
    commit_lock: Mutex<()>,
    halted: AtomicBool,
}

impl ObjectStore {
    /// Opens the store of `app_id` on a shared backing store.
    ///
    /// Several applications may share one backend; each only ever touches
    /// its own namespace.
    pub fn open(app_id: AppId, backend: Arc<dyn BackingStore>, config: StoreConfig) -> Self {
        let stats = Arc::new(StoreStats::new());
        let locks = LockTable::new(Arc::clone(&stats), config.slow_wait_threshold);
        tracing::info!(app = %app_id, "object store opened");
        Self {
            inner: Arc::new(StoreInner {
                app_id,
                backend,
                config,
                locks,
                stats,
                registry: RwLock::new(HashMap::new()),
                next_txid: AtomicU64::new(1),
                clock: AtomicU64::new(1),
                next_seq: AtomicU64::new(1),
                committed_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                commit_lock: Mutex::new(()),
                halted: AtomicBool::new(false),
            }),
        }
    }

    /// Opens a store on a fresh in-memory backend.
    #[must_use]
    pub fn open_in_memory(app_id: AppId) -> Self {
        Self::open(
            app_id,
            Arc::new(InMemoryBackend::new()),
            StoreConfig::default().sync_on_commit(false),
        )
    }

    /// Begins a new transaction for `app_id`.
    ///
    /// The transaction gets a timestamp strictly greater than that of every
    /// transaction begun before it on this store.
    ///
    /// # Errors
    ///
    /// - `UnknownApplication` if `app_id` is not the application of this store
    /// - `StoreHalted` after a fatal backing store failure
    pub fn new_transaction(&self, app_id: AppId) -> CoreResult<Transaction> {
        let inner = &self.inner;
        if app_id != inner.app_id {
            return Err(CoreError::UnknownApplication {
                requested: app_id,
                served: inner.app_id,
            });
        }
        if inner.is_halted() {
            return Err(CoreError::StoreHalted);
        }

        let id = TransactionId::new(inner.next_txid.fetch_add(1, Ordering::SeqCst));
        let timestamp = Timestamp::new(inner.clock.fetch_add(1, Ordering::SeqCst));
        let handle = TxnHandle::new(id, timestamp);
        let epoch = inner.epoch.load(Ordering::SeqCst);

        inner.registry.write().insert(id, Arc::clone(&handle));
        inner.stats.record_start();
        tracing::debug!(txn = %id, ts = %timestamp, "transaction started");

        Ok(Transaction::new(handle, Arc::clone(inner), epoch))
    }

    /// Runs `f` in a new transaction.
    ///
    /// If `f` returns `Ok`, the transaction is committed. If it returns
    /// `Err`, the transaction is aborted. There is no retry; see
    /// [`CoreError::is_retryable`].
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction) -> CoreResult<T>,
    {
        let mut txn = self.new_transaction(self.inner.app_id)?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort();
                Err(e)
            }
        }
    }

    /// Removes every object of the application.
    ///
    /// This is not transactional; callers ensure no task of the application
    /// is running. Transactions begun before the wipe can no longer commit:
    /// they fail validation with `CommitConflict`.
    ///
    /// # Errors
    ///
    /// - `StoreFailure` if the backend cannot wipe the namespace
    /// - `StoreHalted` after an earlier fatal failure
    pub fn clear_all(&self) -> CoreResult<usize> {
        let inner = &self.inner;
        let _commit = inner.commit_lock.lock();
        if inner.is_halted() {
            return Err(CoreError::StoreHalted);
        }
        inner.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = inner
            .backend
            .clear(inner.app_id.as_u64())
            .map_err(|e| inner.store_failed("clear", e.into()))?;
        if inner.config.sync_on_commit {
            inner
                .backend
                .sync()
                .map_err(|e| inner.store_failed("sync", e.into()))?;
        }
        tracing::info!(app = %inner.app_id, removed, "object store cleared");
        Ok(removed)
    }

    /// Wounds the active transaction `txn`, releasing all of its locks.
    ///
    /// Returns false if no such transaction is active or it is already
    /// committing.
    pub fn interrupt(&self, txn: TransactionId) -> bool {
        let handle = self.inner.registry.read().get(&txn).cloned();
        handle.is_some_and(|h| self.inner.locks.interrupt(&h))
    }

    /// Returns the number of registered transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// Returns the number of committed objects of the application.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the backend cannot be read.
    pub fn object_count(&self) -> CoreResult<usize> {
        let inner = &self.inner;
        inner
            .backend
            .count(inner.app_id.as_u64())
            .map_err(|e| inner.store_failed("count", e.into()))
    }

    /// Returns the IDs of every committed object, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the backend cannot be read.
    pub fn object_ids(&self) -> CoreResult<Vec<ObjectId>> {
        let inner = &self.inner;
        let keys = inner
            .backend
            .keys(inner.app_id.as_u64())
            .map_err(|e| inner.store_failed("keys", e.into()))?;
        Ok(keys.into_iter().map(ObjectId::from_bytes).collect())
    }

    /// Returns the sequence number of the last commit that wrote anything
    /// since this store was opened.
    ///
    /// Sequence numbers restart at 1 on every open, so this is 0 on a
    /// freshly reopened store even though its records carry versions from
    /// earlier runs. Versions are only ever compared within one run.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.inner.committed_seq()
    }

    /// Returns a snapshot of the store counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Returns the application this store serves.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.inner.app_id
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns true once a backing store failure has halted the store.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.inner.is_halted()
    }

    /// Returns the transaction holding the lock on `object`, if any.
    #[must_use]
    pub fn lock_holder(&self, object: ObjectId) -> Option<TransactionId> {
        self.inner.locks.holder(object)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("app_id", &self.inner.app_id)
            .field("active_count", &self.active_count())
            .field("committed_seq", &self.committed_seq())
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

impl StoreInner {
    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub(crate) fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    pub(crate) fn unregister(&self, txn: TransactionId) {
        self.registry.write().remove(&txn);
    }

    /// Reads the committed record of `id`.
    ///
    /// Read errors and undecodable records are store failures.
    pub(crate) fn read_record(&self, id: ObjectId) -> CoreResult<Option<ObjectRecord>> {
        if self.is_halted() {
            return Err(CoreError::StoreHalted);
        }
        let bytes = self
            .backend
            .read(self.app_id.as_u64(), id.as_bytes())
            .map_err(|e| self.store_failed("read", e.into()))?;
        bytes
            .map(|bytes| {
                ObjectRecord::decode(id, &bytes).map_err(|e| self.store_failed("decode", e))
            })
            .transpose()
    }

    fn committed_version(&self, id: ObjectId) -> CoreResult<Option<SequenceNumber>> {
        Ok(self.read_record(id)?.map(|record| record.version))
    }

    /// Validates `set` against committed state and applies it atomically.
    ///
    /// Returns the sequence number of the commit. A transaction that changed
    /// nothing writes no batch and gets the current committed sequence.
    pub(crate) fn commit_changes(
        &self,
        txn: TransactionId,
        epoch: u64,
        set: &WorkingSet,
    ) -> CoreResult<SequenceNumber> {
        let _commit = self.commit_lock.lock();

        if self.is_halted() {
            return Err(CoreError::StoreHalted);
        }
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Err(CoreError::commit_conflict("object store was cleared"));
        }
        for (&id, &observed) in set.reads() {
            let current = self.committed_version(id)?;
            if current != observed {
                return Err(CoreError::commit_conflict(format!(
                    "object {id} changed since it was read"
                )));
            }
        }
        for (&id, _) in set.creates() {
            let exists = self
                .backend
                .contains(self.app_id.as_u64(), id.as_bytes())
                .map_err(|e| self.store_failed("contains", e.into()))?;
            if exists {
                return Err(CoreError::commit_conflict(format!(
                    "created object {id} already exists"
                )));
            }
        }

        if !set.has_changes() {
            return Ok(self.committed_seq());
        }

        let seq = SequenceNumber::new(self.next_seq.fetch_add(1, Ordering::SeqCst));
        let mut batch = WriteBatch::new();
        for (id, staged) in set.writes().chain(set.creates()) {
            let record = ObjectRecord::new(seq, staged.type_tag, staged.payload.clone());
            batch.put(*id.as_bytes(), record.encode()?);
        }
        for id in set.deletes() {
            batch.delete(*id.as_bytes());
        }

        self.backend.apply(self.app_id.as_u64(), &batch).map_err(|e| {
            tracing::debug!(%txn, %seq, "commit batch not applied");
            self.store_failed("apply", e.into())
        })?;
        if self.config.sync_on_commit {
            self.backend
                .sync()
                .map_err(|e| self.store_failed("sync", e.into()))?;
        }

        self.committed_seq.store(seq.as_u64(), Ordering::SeqCst);
        Ok(seq)
    }

    /// Counts and logs a backing store failure, halting the store if so
    /// configured. Returns `error` for propagation.
    fn store_failed(&self, operation: &'static str, error: CoreError) -> CoreError {
        self.stats.record_store_failure();
        tracing::error!(app = %self.app_id, operation, %error, "backing store failed");
        if self.config.halt_on_store_failure && !self.halted.swap(true, Ordering::SeqCst) {
            tracing::error!(app = %self.app_id, "object store halted");
        }
        error
    }
}
