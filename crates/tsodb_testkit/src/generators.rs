//! Property-based test generators using proptest.
//!
//! Provides strategies for generating object IDs, object values and
//! sequences of transactional operations.

use crate::fixtures::{Counter, Note};
use proptest::prelude::*;
use tsodb_core::ObjectId;

/// Strategy for generating object IDs.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    prop::array::uniform16(any::<u8>()).prop_map(ObjectId::from_bytes)
}

/// Strategy for generating names of named objects.
pub fn object_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.]{0,23}").expect("Invalid regex")
}

/// Strategy for generating counters.
pub fn counter_strategy() -> impl Strategy<Value = Counter> {
    (0u64..1_000_000).prop_map(Counter::new)
}

/// Strategy for generating notes without links.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    prop::string::string_regex("[ -~]{0,64}")
        .expect("Invalid regex")
        .prop_map(Note::new)
}

/// One step of a generated single-threaded workload.
///
/// Targets are indices into the objects created so far; executors reduce
/// them modulo the number of live objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOp {
    /// Create a counter with the given value.
    Create(u64),
    /// Add to a counter.
    Add {
        /// Target index.
        target: usize,
        /// Amount to add.
        amount: u64,
    },
    /// Destroy a counter.
    Destroy(usize),
    /// PEEK a counter.
    Peek(usize),
}

/// Strategy for generating a single operation.
pub fn task_op_strategy() -> impl Strategy<Value = TaskOp> {
    prop_oneof![
        3 => (0u64..1000).prop_map(TaskOp::Create),
        4 => (any::<usize>(), 1u64..100).prop_map(|(target, amount)| TaskOp::Add { target, amount }),
        1 => any::<usize>().prop_map(TaskOp::Destroy),
        2 => any::<usize>().prop_map(TaskOp::Peek),
    ]
}

/// A generated transaction: its operations and whether it commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTask {
    /// Operations in order.
    pub ops: Vec<TaskOp>,
    /// Commit if true, abort otherwise.
    pub commit: bool,
}

/// Strategy for generating a workload of tasks.
pub fn workload_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<GeneratedTask>> {
    prop::collection::vec(
        (
            prop::collection::vec(task_op_strategy(), 1..8),
            prop::bool::weighted(0.8),
        )
            .prop_map(|(ops, commit)| GeneratedTask { ops, commit }),
        1..max_tasks.max(2),
    )
}
