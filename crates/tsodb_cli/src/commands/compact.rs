//! Compact command implementation.

use std::path::Path;
use tsodb_storage::FileBackend;

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No object store found at {:?}", path).into());
    }

    println!("Compacting object store at {:?}", path);
    let backend = FileBackend::open(path)?;
    let stats = backend.compact()?;

    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!("  Live records: {}", stats.records);
    println!("  Size before:  {} bytes", stats.bytes_before);
    println!("  Size after:   {} bytes", stats.bytes_after);
    println!(
        "  Space saved:  {} bytes ({:.1}%)",
        saved,
        if stats.bytes_before > 0 {
            (saved as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
    println!("✓ Compaction complete");
    Ok(())
}
