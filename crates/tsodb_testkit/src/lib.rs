//! # TSODB Testkit
//!
//! Test utilities for TSODB.
//!
//! This crate provides:
//! - Test fixtures: stores over memory or temporary files, sample object
//!   types, a backend with injectable failures
//! - Property-based test generators using proptest
//! - A reference task runner that retries a task on fresh transactions
//! - Contended stress workloads
//!
//! ## Usage
//!
//! ```rust
//! use tsodb_core::AccessMode;
//! use tsodb_testkit::prelude::*;
//!
//! let fixture = TestStore::memory();
//! let counter = fixture.create(Counter::new(0));
//! let outcome = run_task(&fixture, &RetryPolicy::default(), |txn| {
//!     txn.modify(counter, |c| c.value += 1)
//! })
//! .unwrap();
//! assert_eq!(outcome.attempts, 1);
//! assert_eq!(fixture.peek(counter).value, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod retry;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::retry::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use retry::*;
pub use stress::*;
