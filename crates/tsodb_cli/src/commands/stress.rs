//! Stress command implementation.

use std::path::Path;
use std::sync::Arc;
use tsodb_core::{AppId, ObjectStore, StoreConfig};
use tsodb_storage::{BackingStore, FileBackend, InMemoryBackend};
use tsodb_testkit::{run_counter_workload, RetryPolicy, StressConfig};

/// Runs the stress command against a file store, or in memory if no path
/// is given.
pub fn run(
    path: Option<&Path>,
    app: u64,
    config: &StressConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend: Arc<dyn BackingStore> = match path {
        Some(path) => Arc::new(FileBackend::open_with_create_dirs(path)?),
        None => Arc::new(InMemoryBackend::new()),
    };
    let store = ObjectStore::open(AppId::new(app), backend, StoreConfig::default());

    println!(
        "Running {} threads x {} tasks over {} counters{}",
        config.threads,
        config.tasks_per_thread,
        config.objects,
        path.map(|p| format!(" in {:?}", p)).unwrap_or_default()
    );

    let result = run_counter_workload(&store, config, &RetryPolicy::default())?;
    result.print_summary("Counter workload");

    if result.is_consistent() {
        println!("✓ All committed increments accounted for");
        Ok(())
    } else {
        Err(format!(
            "counter sum {} does not match {} committed increments",
            result.final_sum, result.expected_sum
        )
        .into())
    }
}
