//! Write batches.

use crate::backend::ObjectKey;
use std::collections::BTreeMap;

/// A single operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or replace the stored bytes.
    Put(Vec<u8>),
    /// Remove the key.
    Delete,
}

/// An ordered set of operations applied atomically.
///
/// Operations are kept sorted by key, so every consumer walks a batch in the
/// same per-object order. A later operation on the same key replaces the
/// earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: BTreeMap<ObjectKey, BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put.
    pub fn put(&mut self, key: ObjectKey, bytes: Vec<u8>) {
        self.ops.insert(key, BatchOp::Put(bytes));
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: ObjectKey) {
        self.ops.insert(key, BatchOp::Delete);
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates operations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &BatchOp)> {
        self.ops.iter()
    }

    /// Total payload bytes carried by puts.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.ops
            .values()
            .map(|op| match op {
                BatchOp::Put(bytes) => bytes.len(),
                BatchOp::Delete => 0,
            })
            .sum()
    }
}
