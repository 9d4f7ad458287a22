//! TSODB CLI
//!
//! Command-line tools for TSODB object store files.
//!
//! # Commands
//!
//! - `stats` - Display object counts and file statistics
//! - `verify` - Check that every stored object record parses
//! - `clear` - Remove every object of one application
//! - `compact` - Rewrite the log to reclaim space
//! - `stress` - Run a contended counter workload and check its result

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TSODB command-line object store tools.
#[derive(Parser)]
#[command(name = "tsodb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the object store log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display object counts and file statistics
    Stats {
        /// Application to report on (all applications if omitted)
        #[arg(short, long)]
        app: Option<u64>,

        /// Break object counts down by type tag
        #[arg(short, long)]
        types: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that every stored object record parses
    Verify,

    /// Remove every object of one application
    Clear {
        /// Application to clear
        #[arg(short, long)]
        app: u64,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Rewrite the log to reclaim space
    Compact,

    /// Run a contended counter workload
    Stress {
        /// Worker threads
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Tasks committed by each worker
        #[arg(long, default_value = "250")]
        tasks: usize,

        /// Shared counters
        #[arg(long, default_value = "8")]
        objects: usize,

        /// Counters incremented by each task
        #[arg(long, default_value = "2")]
        per_task: usize,

        /// Share of tasks using ATTEMPT instead of GET
        #[arg(long, default_value = "0.1")]
        attempt_ratio: f64,

        /// Application the workload runs as
        #[arg(short, long, default_value = "1")]
        app: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Stats { app, types, format } => {
            let path = cli.path.ok_or("Store path required for stats")?;
            commands::stats::run(&path, app, types, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Clear { app, dry_run } => {
            let path = cli.path.ok_or("Store path required for clear")?;
            commands::clear::run(&path, app, dry_run)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Stress {
            threads,
            tasks,
            objects,
            per_task,
            attempt_ratio,
            app,
        } => {
            let config = tsodb_testkit::StressConfig {
                threads,
                tasks_per_thread: tasks,
                objects,
                objects_per_task: per_task,
                attempt_ratio,
            };
            commands::stress::run(cli.path.as_deref(), app, &config)?;
        }
        Commands::Version => {
            println!("TSODB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("TSODB Core v{}", tsodb_core::VERSION);
        }
    }

    Ok(())
}
