//! Shared transaction handle.

use crate::transaction::TransactionState;
use crate::types::{TransactionId, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

/// The part of a transaction other threads can see.
///
/// The owning [`Transaction`](crate::Transaction) drives the handle through
/// its lifecycle; the lock table and the store registry keep clones so they
/// can compare ages and wound the transaction from another thread.
///
/// Lock order: the lock table mutex may be held while taking `state`, never
/// the other way round.
#[derive(Debug)]
pub(crate) struct TxnHandle {
    id: TransactionId,
    timestamp: Timestamp,
    state: Mutex<TransactionState>,
}

impl TxnHandle {
    pub(crate) fn new(id: TransactionId, timestamp: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            id,
            timestamp,
            state: Mutex::new(TransactionState::Active),
        })
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub(crate) fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Active -> Committing. Returns the current state on failure.
    pub(crate) fn begin_commit(&self) -> Result<(), TransactionState> {
        let mut state = self.state.lock();
        match *state {
            TransactionState::Active => {
                *state = TransactionState::Committing;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Active -> Interrupted. A committing or finished transaction is left
    /// alone; returns whether the wound landed.
    pub(crate) fn try_interrupt(&self) -> bool {
        let mut state = self.state.lock();
        if *state == TransactionState::Active {
            *state = TransactionState::Interrupted;
            true
        } else {
            false
        }
    }

    /// Active or Committing -> Aborted. Returns whether the state changed.
    pub(crate) fn mark_aborted(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            TransactionState::Active | TransactionState::Committing => {
                *state = TransactionState::Aborted;
                true
            }
            _ => false,
        }
    }

    /// Committing -> Committed.
    pub(crate) fn mark_committed(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(*state, TransactionState::Committing);
        *state = TransactionState::Committed;
    }
}
