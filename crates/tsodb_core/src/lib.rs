//! # TSODB Core
//!
//! Timestamp-ordered transactional object store for game servers.
//!
//! This crate provides:
//! - [`ObjectStore`]: per-application factory and registry of transactions
//! - [`Transaction`]: GET / PEEK / ATTEMPT lookups, staged creates, updates
//!   and deletions, atomic commit
//! - Wound-wait locking: older transactions never wait on younger ones, so
//!   there are no deadlocks and the oldest transaction always progresses
//! - [`ObjectRef`]: typed, serializable references between game objects
//!
//! Committed state lives in a [`tsodb_storage::BackingStore`]; object values
//! are encoded with [`tsodb_codec`].
//!
//! ## Retrying
//!
//! The store never retries on its own. A task that fails with an error for
//! which [`CoreError::is_retryable`] holds should be rerun from the start on
//! a fresh transaction, which gets a newer timestamp.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod config;
mod error;
mod lock;
mod object;
mod stats;
mod store;
mod transaction;
mod types;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use object::{ManagedObject, ObjectId, ObjectRecord, ObjectRef, RECORD_FORMAT};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::ObjectStore;
pub use transaction::{AccessMode, Transaction, TransactionState};
pub use types::{AppId, SequenceNumber, Timestamp, TransactionId};
