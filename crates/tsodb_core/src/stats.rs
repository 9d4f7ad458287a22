//! Object store statistics.
//!
//! Counters are updated by transactions and the lock table as they run, and
//! can be read at any time without stopping the store.
//!
//! ```rust
//! use tsodb_core::{AppId, ObjectStore, StoreConfig};
//! use tsodb_storage::InMemoryBackend;
//! use std::sync::Arc;
//!
//! let store = ObjectStore::open(AppId::new(1), Arc::new(InMemoryBackend::new()), StoreConfig::default());
//! let mut txn = store.new_transaction(AppId::new(1)).unwrap();
//! txn.abort();
//! assert_eq!(store.stats().transactions_aborted, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live object store counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    /// Transactions wounded by an older one (or by an administrator).
    transactions_interrupted: AtomicU64,
    /// GET requests that had to wait for a holder.
    lock_waits: AtomicU64,
    /// ATTEMPT requests that found the object held.
    lock_conflicts: AtomicU64,
    commit_conflicts: AtomicU64,
    objects_written: AtomicU64,
    objects_deleted: AtomicU64,
    store_failures: AtomicU64,
}

impl StoreStats {
    /// Creates a new zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, written: usize, deleted: usize) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.objects_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.objects_deleted
            .fetch_add(deleted as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interrupt(&self) {
        self.transactions_interrupted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_conflict(&self) {
        self.lock_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_conflict(&self) {
        self.commit_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            transactions_interrupted: self.transactions_interrupted.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            commit_conflicts: self.commit_conflicts.load(Ordering::Relaxed),
            objects_written: self.objects_written.load(Ordering::Relaxed),
            objects_deleted: self.objects_deleted.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of object store statistics.
///
/// Unlike [`StoreStats`], this is a plain struct that can be compared,
/// printed or serialized.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct StatsSnapshot {
    /// Transactions begun.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted, including ATTEMPT abandonments and failed commits.
    pub transactions_aborted: u64,
    /// Transactions wounded.
    pub transactions_interrupted: u64,
    /// GET requests that waited for an older holder.
    pub lock_waits: u64,
    /// ATTEMPT requests refused.
    pub lock_conflicts: u64,
    /// Commits rejected by validation.
    pub commit_conflicts: u64,
    /// Objects created or updated by committed transactions.
    pub objects_written: u64,
    /// Objects destroyed by committed transactions.
    pub objects_deleted: u64,
    /// Backing store failures during commit.
    pub store_failures: u64,
}

impl StatsSnapshot {
    /// Transactions that reached a terminal state.
    #[must_use]
    pub fn transactions_finished(&self) -> u64 {
        self.transactions_committed + self.transactions_aborted + self.transactions_interrupted
    }
}
