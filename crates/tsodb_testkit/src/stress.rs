//! Stress workloads for TSODB.
//!
//! These workloads hammer a small set of counters from many threads so that
//! transactions constantly collide, then check that no committed increment
//! was lost or applied twice.

use crate::fixtures::Counter;
use crate::retry::{run_task, RetryPolicy};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tsodb_core::{AccessMode, CoreError, CoreResult, ObjectRef, ObjectStore, StatsSnapshot};

/// Configuration for stress workloads.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Tasks each worker commits.
    pub tasks_per_thread: usize,
    /// Number of shared counters.
    pub objects: usize,
    /// Counters each task increments.
    pub objects_per_task: usize,
    /// Share of tasks that use ATTEMPT instead of GET.
    pub attempt_ratio: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            tasks_per_thread: 250,
            objects: 8,
            objects_per_task: 2,
            attempt_ratio: 0.1,
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Tasks that committed.
    pub committed_tasks: u64,
    /// Attempts beyond the first, summed over all tasks.
    pub retries: u64,
    /// Sum of all counters after the run.
    pub final_sum: u64,
    /// Sum the counters must have.
    pub expected_sum: u64,
    /// Total duration.
    pub duration: Duration,
    /// Committed tasks per second.
    pub tasks_per_second: f64,
    /// Store counters after the run.
    pub stats: StatsSnapshot,
}

impl StressResult {
    /// Returns true if no committed increment was lost or duplicated.
    pub fn is_consistent(&self) -> bool {
        self.final_sum == self.expected_sum
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Committed tasks: {}", self.committed_tasks);
        println!("Retries: {}", self.retries);
        println!("Wounds: {}", self.stats.transactions_interrupted);
        println!("Lock waits: {}", self.stats.lock_waits);
        println!("Attempt conflicts: {}", self.stats.lock_conflicts);
        println!("Final sum: {} (expected {})", self.final_sum, self.expected_sum);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tasks/sec", self.tasks_per_second);
    }
}

/// Creates `count` zeroed counters.
///
/// # Errors
///
/// Returns an error if the creating transaction fails.
pub fn create_counters(store: &ObjectStore, count: usize) -> CoreResult<Vec<ObjectRef<Counter>>> {
    store.transaction(|txn| (0..count).map(|_| txn.create(Counter::new(0))).collect())
}

/// Sums the committed values of `counters`.
///
/// # Errors
///
/// Returns an error if a counter cannot be read.
pub fn sum_counters(store: &ObjectStore, counters: &[ObjectRef<Counter>]) -> CoreResult<u64> {
    let mut txn = store.new_transaction(store.app_id())?;
    let mut sum = 0;
    for &counter in counters {
        sum += txn.lookup(counter, AccessMode::Peek)?.value;
    }
    txn.abort();
    Ok(sum)
}

/// Runs the contended counter workload.
///
/// Each task picks `objects_per_task` distinct counters in random order and
/// increments each by one, so lock orders differ between tasks and older
/// transactions regularly wound younger ones.
///
/// # Errors
///
/// Returns the first error a task could not recover from.
pub fn run_counter_workload(
    store: &ObjectStore,
    config: &StressConfig,
    policy: &RetryPolicy,
) -> CoreResult<StressResult> {
    if config.objects_per_task == 0 || config.objects_per_task > config.objects {
        return Err(CoreError::invalid_operation(
            "objects_per_task must be between 1 and objects",
        ));
    }

    let counters = Arc::new(create_counters(store, config.objects)?);
    let baseline = sum_counters(store, &counters)?;
    let retries = Arc::new(AtomicU64::new(0));
    let committed = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = store.clone();
            let counters = Arc::clone(&counters);
            let retries = Arc::clone(&retries);
            let committed = Arc::clone(&committed);
            let config = config.clone();
            let policy = policy.clone();

            thread::spawn(move || -> CoreResult<()> {
                let mut rng = rand::thread_rng();
                for _ in 0..config.tasks_per_thread {
                    let picked: Vec<ObjectRef<Counter>> = counters
                        .choose_multiple(&mut rng, config.objects_per_task)
                        .copied()
                        .collect();
                    let mode = if rng.gen_bool(config.attempt_ratio) {
                        AccessMode::Attempt
                    } else {
                        AccessMode::Get
                    };

                    let outcome = run_task(&store, &policy, |txn| {
                        for &counter in &picked {
                            let mut value = txn.lookup(counter, mode)?;
                            value.value += 1;
                            txn.update(counter, value)?;
                        }
                        Ok(())
                    })?;

                    committed.fetch_add(1, Ordering::Relaxed);
                    retries.fetch_add(u64::from(outcome.attempts - 1), Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| CoreError::invalid_operation("stress worker panicked"))??;
    }
    let duration = start.elapsed();

    let committed_tasks = committed.load(Ordering::Relaxed);
    let final_sum = sum_counters(store, &counters)? - baseline;
    let tasks_per_second = if duration.as_secs_f64() > 0.0 {
        committed_tasks as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    Ok(StressResult {
        committed_tasks,
        retries: retries.load(Ordering::Relaxed),
        final_sum,
        expected_sum: committed_tasks * config.objects_per_task as u64,
        duration,
        tasks_per_second,
        stats: store.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn test_contended_workload_is_consistent() {
        let fixture = TestStore::memory();
        let config = StressConfig {
            threads: 4,
            tasks_per_thread: 100,
            objects: 4,
            objects_per_task: 2,
            attempt_ratio: 0.2,
        };

        let result = run_counter_workload(&fixture, &config, &RetryPolicy::default()).unwrap();
        assert_eq!(result.committed_tasks, 400);
        assert!(result.is_consistent());
        assert_eq!(fixture.active_count(), 0);
    }

    #[test]
    fn test_single_object_workload() {
        let fixture = TestStore::memory();
        let config = StressConfig {
            threads: 6,
            tasks_per_thread: 50,
            objects: 1,
            objects_per_task: 1,
            attempt_ratio: 0.0,
        };

        let result = run_counter_workload(&fixture, &config, &RetryPolicy::default()).unwrap();
        assert_eq!(result.final_sum, 300);
        assert!(result.is_consistent());
    }

    #[test]
    fn test_file_backed_workload() {
        let fixture = TestStore::file();
        let config = StressConfig {
            threads: 2,
            tasks_per_thread: 25,
            ..Default::default()
        };

        let result = run_counter_workload(&fixture, &config, &RetryPolicy::default()).unwrap();
        assert!(result.is_consistent());
        let fixture = fixture.reopen();
        assert_eq!(fixture.object_count().unwrap(), config.objects);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fixture = TestStore::memory();
        let config = StressConfig {
            objects: 2,
            objects_per_task: 3,
            ..Default::default()
        };
        let result = run_counter_workload(&fixture, &config, &RetryPolicy::default());
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }
}
