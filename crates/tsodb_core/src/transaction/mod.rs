//! Transactions over persistent objects.
//!
//! A transaction accesses objects in one of three [`AccessMode`]s, stages
//! creates, updates and deletions privately, and applies them atomically on
//! commit. Conflicts between transactions are resolved by timestamp: see
//! the lock module for the wound-wait rules.

mod handle;
mod state;
mod txn;

pub(crate) use handle::TxnHandle;
pub(crate) use state::WorkingSet;
pub use state::TransactionState;
pub use txn::Transaction;

/// How a lookup accesses an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Exclusive lock; waits for older holders, wounds younger ones.
    Get,
    /// Last committed value. No lock, never blocks, never sees uncommitted
    /// changes.
    Peek,
    /// Exclusive lock if free; otherwise the transaction is abandoned with
    /// `LockConflict`.
    Attempt,
}
