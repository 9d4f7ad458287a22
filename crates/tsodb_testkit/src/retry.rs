//! Reference task runner.
//!
//! The object store never retries on its own. Game servers run tasks under
//! a scheduler that reruns a task on a fresh transaction whenever it fails
//! with a retryable error. This module is a small, synchronous version of
//! that loop, used by tests and by the CLI stress workload.
//!
//! Interrupted tasks are rerun immediately: the new transaction gets a newer
//! timestamp and simply queues behind the older ones. Commit conflicts and
//! refused ATTEMPTs back off first, with exponential delay and random
//! jitter, so tasks that keep colliding spread out.

use rand::Rng;
use std::thread;
use std::time::Duration;
use tsodb_core::{CoreError, CoreResult, ObjectStore, Transaction};

/// When and how often to rerun a failed task.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry after a conflict.
    pub base_backoff: Duration,
    /// Upper bound for the backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            base_backoff: Duration::from_micros(100),
            max_backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs a task once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before attempt number `attempt + 1` (attempts count from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let cap = self
            .base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let cap_micros = u64::try_from(cap.as_micros()).unwrap_or(u64::MAX);
        if cap_micros == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::thread_rng().gen_range(cap_micros / 2..=cap_micros))
    }
}

/// A task that eventually committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome<T> {
    /// What the task returned on the committed attempt.
    pub value: T,
    /// Attempts used, including the committed one.
    pub attempts: u32,
}

/// Runs `task` on fresh transactions until one commits.
///
/// `task` must be safe to rerun from the start: every attempt sees a new
/// transaction and none of the effects of earlier attempts.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last retryable error once
/// `policy.max_attempts` attempts have failed.
pub fn run_task<T, F>(store: &ObjectStore, policy: &RetryPolicy, mut task: F) -> CoreResult<TaskOutcome<T>>
where
    F: FnMut(&mut Transaction) -> CoreResult<T>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut txn = store.new_transaction(store.app_id())?;
        let result = task(&mut txn).and_then(|value| txn.commit().map(|_| value));

        let error = match result {
            Ok(value) => {
                return Ok(TaskOutcome {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => e,
        };
        txn.abort();

        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(error);
        }

        tracing::debug!(txn = %txn.id(), attempt, %error, "retrying task");
        if matches!(
            error,
            CoreError::CommitConflict { .. } | CoreError::LockConflict { .. }
        ) {
            thread::sleep(policy.backoff(attempt));
        }
    }
}
