//! # TSODB Storage
//!
//! Backing store trait and implementations for TSODB.
//!
//! This crate provides the lowest-level storage abstraction for TSODB.
//! Backing stores are **opaque ID-to-bytes stores** - they do not interpret
//! the records they hold.
//!
//! ## Design Principles
//!
//! - Stores map an application namespace plus a 16-byte object key to bytes
//! - A [`WriteBatch`] is applied atomically: all of it lands or none of it
//! - No knowledge of transactions, locks, object records or codecs
//! - Must be `Send + Sync`; every transaction of an application shares one store
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral game worlds
//! - [`FileBackend`] - Append-only, checksummed log replayed on open
//!
//! ## Example
//!
//! ```rust
//! use tsodb_storage::{BackingStore, InMemoryBackend, WriteBatch};
//!
//! let backend = InMemoryBackend::new();
//! let mut batch = WriteBatch::new();
//! batch.put([7u8; 16], b"hello world".to_vec());
//! backend.apply(1, &batch).unwrap();
//! assert_eq!(backend.read(1, &[7u8; 16]).unwrap().unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::{AppNamespace, BackingStore, ObjectKey};
pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::{CompactionStats, FileBackend};
pub use frame::compute_crc32;
pub use memory::InMemoryBackend;
