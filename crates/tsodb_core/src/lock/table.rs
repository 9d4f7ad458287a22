//! Lock table implementation.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectId;
use crate::stats::StoreStats;
use crate::transaction::{TransactionState, TxnHandle};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How to handle a held object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    /// Wound a younger holder or wait for an older one.
    Wait,
    /// Fail immediately with `LockConflict`.
    Try,
}

/// Outcome of a successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockGrant {
    /// The lock was taken by this request.
    Acquired,
    /// The requester already held the lock.
    AlreadyHeld,
}

#[derive(Default)]
struct LockState {
    owners: HashMap<ObjectId, Arc<TxnHandle>>,
    held: HashMap<TransactionId, HashSet<ObjectId>>,
}

impl LockState {
    fn grant(&mut self, requester: &Arc<TxnHandle>, object: ObjectId) {
        self.owners.insert(object, Arc::clone(requester));
        self.held.entry(requester.id()).or_default().insert(object);
    }

    fn release_all(&mut self, txn: TransactionId) -> usize {
        let Some(objects) = self.held.remove(&txn) else {
            return 0;
        };
        for object in &objects {
            self.owners.remove(object);
        }
        objects.len()
    }
}

/// Table of exclusive object locks shared by every transaction of a store.
pub(crate) struct LockTable {
    state: Mutex<LockState>,
    released: Condvar,
    stats: Arc<StoreStats>,
    slow_wait_threshold: Duration,
}

impl LockTable {
    pub(crate) fn new(stats: Arc<StoreStats>, slow_wait_threshold: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            stats,
            slow_wait_threshold,
        }
    }

    /// Acquires the exclusive lock on `object` for `requester`.
    ///
    /// # Errors
    ///
    /// - `LockConflict` if `mode` is [`LockMode::Try`] and another
    ///   transaction holds the object
    /// - `Interrupted` if the requester is wounded before or while waiting
    /// - `TransactionClosed` if the requester is no longer active
    pub(crate) fn acquire(
        &self,
        requester: &Arc<TxnHandle>,
        object: ObjectId,
        mode: LockMode,
    ) -> CoreResult<LockGrant> {
        let mut state = self.state.lock();
        let mut waiting_since: Option<Instant> = None;
        let mut warned = false;

        loop {
            match requester.state() {
                TransactionState::Active => {}
                TransactionState::Interrupted => {
                    return Err(CoreError::interrupted(requester.id()));
                }
                other => {
                    return Err(CoreError::TransactionClosed {
                        txn: requester.id(),
                        state: other,
                    });
                }
            }

            let holder = match state.owners.get(&object).cloned() {
                None => {
                    state.grant(requester, object);
                    if let Some(since) = waiting_since {
                        tracing::debug!(
                            txn = %requester.id(),
                            %object,
                            waited_ms = since.elapsed().as_millis() as u64,
                            "lock granted after wait"
                        );
                    }
                    return Ok(LockGrant::Acquired);
                }
                Some(holder) if holder.id() == requester.id() => {
                    return Ok(LockGrant::AlreadyHeld);
                }
                Some(holder) => holder,
            };

            if mode == LockMode::Try {
                self.stats.record_lock_conflict();
                return Err(CoreError::lock_conflict(object));
            }

            if requester.timestamp().is_older_than(holder.timestamp()) && holder.try_interrupt() {
                let released = state.release_all(holder.id());
                self.stats.record_interrupt();
                tracing::info!(
                    wounder = %requester.id(),
                    victim = %holder.id(),
                    %object,
                    released,
                    "wounded younger lock holder"
                );
                self.released.notify_all();
                continue;
            }

            let since = *waiting_since.get_or_insert_with(|| {
                self.stats.record_lock_wait();
                Instant::now()
            });
            if warned {
                self.released.wait(&mut state);
            } else {
                let remaining = self.slow_wait_threshold.saturating_sub(since.elapsed());
                let timed_out = self.released.wait_for(&mut state, remaining).timed_out();
                if timed_out && since.elapsed() >= self.slow_wait_threshold {
                    warned = true;
                    tracing::warn!(
                        txn = %requester.id(),
                        holder = %holder.id(),
                        %object,
                        waited_ms = since.elapsed().as_millis() as u64,
                        "slow lock wait"
                    );
                }
            }
        }
    }

    /// Releases every lock of `txn` and wakes all waiters.
    pub(crate) fn release_all(&self, txn: TransactionId) -> usize {
        let released = self.state.lock().release_all(txn);
        if released > 0 {
            self.released.notify_all();
        }
        released
    }

    /// Wounds `victim` if it is still active, releasing its locks.
    ///
    /// Returns whether the transaction was interrupted.
    pub(crate) fn interrupt(&self, victim: &TxnHandle) -> bool {
        let mut state = self.state.lock();
        if !victim.try_interrupt() {
            return false;
        }
        let released = state.release_all(victim.id());
        drop(state);
        self.stats.record_interrupt();
        tracing::info!(victim = %victim.id(), released, "transaction interrupted");
        self.released.notify_all();
        true
    }

    /// Returns the transaction currently holding `object`.
    pub(crate) fn holder(&self, object: ObjectId) -> Option<TransactionId> {
        self.state.lock().owners.get(&object).map(|h| h.id())
    }

    /// Returns the number of objects `txn` holds.
    pub(crate) fn held_count(&self, txn: TransactionId) -> usize {
        self.state.lock().held.get(&txn).map_or(0, HashSet::len)
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("locked_objects", &self.state.lock().owners.len())
            .finish_non_exhaustive()
    }
}
