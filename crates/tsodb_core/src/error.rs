//! Error types for TSODB core.

use crate::object::ObjectId;
use crate::transaction::TransactionState;
use crate::types::{AppId, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in TSODB core operations.
///
/// Conflict and interruption outcomes are recoverable: the caller discards
/// the transaction and reruns the task on a fresh one (see
/// [`CoreError::is_retryable`]). Store failures and corrupted records are
/// fatal for the application (see [`CoreError::is_fatal`]).
#[derive(Debug, Error)]
pub enum CoreError {
    /// An ATTEMPT lookup found the object locked by another transaction.
    #[error("lock conflict on object {object}")]
    LockConflict {
        /// The contended object.
        object: ObjectId,
    },

    /// The referenced object does not exist.
    #[error("object not found: {object}")]
    NotFound {
        /// The object ID that was not found.
        object: ObjectId,
    },

    /// Commit-time validation failed; nothing was applied.
    #[error("commit conflict: {reason}")]
    CommitConflict {
        /// Why validation failed.
        reason: String,
    },

    /// The transaction was wounded by an older one.
    #[error("transaction {txn} was interrupted")]
    Interrupted {
        /// The interrupted transaction.
        txn: TransactionId,
    },

    /// Backing store error.
    #[error("store failure: {0}")]
    StoreFailure(#[from] tsodb_storage::StorageError),

    /// The store stopped accepting work after a fatal failure.
    #[error("object store halted after a store failure")]
    StoreHalted,

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tsodb_codec::CodecError),

    /// A stored object record could not be parsed.
    #[error("corrupted object record {object}: {message}")]
    Corrupted {
        /// The object whose record is damaged.
        object: ObjectId,
        /// Description of the damage.
        message: String,
    },

    /// The stored object has a different type than the reference expects.
    #[error("type mismatch on object {object}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The object looked up.
        object: ObjectId,
        /// Type tag carried by the reference.
        expected: String,
        /// Type tag found in the record.
        found: String,
    },

    /// A named object with this name already exists.
    #[error("name already bound: {name}")]
    NameAlreadyBound {
        /// The name.
        name: String,
    },

    /// The transaction already reached a terminal state.
    #[error("transaction {txn} is {state:?}")]
    TransactionClosed {
        /// The transaction.
        txn: TransactionId,
        /// Its terminal state.
        state: TransactionState,
    },

    /// A transaction was requested for an application this store does not serve.
    #[error("unknown application {requested}: store serves {served}")]
    UnknownApplication {
        /// The application asked for.
        requested: AppId,
        /// The application this store is bound to.
        served: AppId,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a lock conflict error.
    pub fn lock_conflict(object: ObjectId) -> Self {
        Self::LockConflict { object }
    }

    /// Creates a not found error.
    pub fn not_found(object: ObjectId) -> Self {
        Self::NotFound { object }
    }

    /// Creates a commit conflict error.
    pub fn commit_conflict(reason: impl Into<String>) -> Self {
        Self::CommitConflict {
            reason: reason.into(),
        }
    }

    /// Creates an interrupted error.
    pub fn interrupted(txn: TransactionId) -> Self {
        Self::Interrupted { txn }
    }

    /// Creates a corrupted record error.
    pub fn corrupted(object: ObjectId, message: impl Into<String>) -> Self {
        Self::Corrupted {
            object,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if rerunning the task on a fresh transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockConflict { .. } | Self::CommitConflict { .. } | Self::Interrupted { .. }
        )
    }

    /// Returns true if the application must stop transactional work.
    ///
    /// A corrupted record means the backing store itself is damaged.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreFailure(_) | Self::StoreHalted | Self::Corrupted { .. }
        )
    }
}
