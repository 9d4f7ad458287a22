//! Stats command implementation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tsodb_core::{ObjectId, ObjectRecord};
use tsodb_storage::{AppNamespace, BackingStore, FileBackend};

/// Object store file statistics.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// Log file path.
    pub path: String,
    /// Log file size in bytes.
    pub file_size: u64,
    /// Per-application statistics.
    pub applications: Vec<AppStats>,
}

/// Statistics for one application namespace.
#[derive(Debug, Serialize)]
pub struct AppStats {
    /// Application ID.
    pub app: u64,
    /// Number of live objects.
    pub objects: usize,
    /// Total payload size in bytes.
    pub payload_bytes: usize,
    /// Highest commit sequence number among live objects.
    pub latest_version: u64,
    /// Object counts by type tag (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeMap<String, usize>>,
}

/// Runs the stats command.
pub fn run(
    path: &Path,
    app: Option<u64>,
    show_types: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No object store found at {:?}", path).into());
    }

    let backend = FileBackend::open(path)?;
    let apps = match app {
        Some(app) => vec![app],
        None => backend.namespaces(),
    };

    let mut report = StatsReport {
        path: path.display().to_string(),
        file_size: backend.size(),
        applications: Vec::with_capacity(apps.len()),
    };
    for app in apps {
        report.applications.push(collect(&backend, app, show_types)?);
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

/// Gathers statistics for one namespace of `backend`.
pub fn collect(
    backend: &dyn BackingStore,
    app: AppNamespace,
    show_types: bool,
) -> Result<AppStats, Box<dyn std::error::Error>> {
    let mut stats = AppStats {
        app,
        objects: 0,
        payload_bytes: 0,
        latest_version: 0,
        types: show_types.then(BTreeMap::new),
    };

    for key in backend.keys(app)? {
        let Some(bytes) = backend.read(app, &key)? else {
            continue;
        };
        let record = ObjectRecord::decode(ObjectId::from_bytes(key), &bytes)?;
        stats.objects += 1;
        stats.payload_bytes += record.payload.len();
        stats.latest_version = stats.latest_version.max(record.version.as_u64());
        if let Some(types) = stats.types.as_mut() {
            *types.entry(record.type_tag).or_insert(0) += 1;
        }
    }
    Ok(stats)
}

fn print_text(report: &StatsReport) {
    println!("Object Store: {}", report.path);
    println!("File size: {} bytes", report.file_size);
    if report.applications.is_empty() {
        println!("No objects stored");
    }
    for app in &report.applications {
        println!();
        println!("Application {}:", app.app);
        println!("  Objects:        {}", app.objects);
        println!("  Payload bytes:  {}", app.payload_bytes);
        println!("  Latest version: {}", app.latest_version);
        if let Some(types) = &app.types {
            for (tag, count) in types {
                println!("    {tag}: {count}");
            }
        }
    }
}
