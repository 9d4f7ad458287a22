//! Clear command implementation.

use std::path::Path;
use std::sync::Arc;
use tsodb_core::{AppId, ObjectStore, StoreConfig};
use tsodb_storage::{BackingStore, FileBackend};

/// Runs the clear command.
pub fn run(path: &Path, app: u64, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No object store found at {:?}", path).into());
    }

    let backend = Arc::new(FileBackend::open(path)?);
    let count = backend.count(app)?;

    if dry_run {
        println!("Would remove {count} objects of application {app} (dry run)");
        return Ok(());
    }

    let store = ObjectStore::open(AppId::new(app), backend, StoreConfig::default());
    let removed = store.clear_all()?;
    println!("✓ Removed {removed} objects of application {app}");
    Ok(())
}
