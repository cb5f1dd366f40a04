//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Staging-based batch synchronization with a remote collaboration service.
#[derive(Debug, Parser)]
#[command(name = "stagesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (otherwise environment, then the standard locations)
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(global = true, short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(global = true, long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect candidates from an export file and stage them as a new batch
    Stage(StageArgs),

    /// Run open batches against the remote service
    Run(RunArgs),

    /// Show recent batches with live per-status counts
    Status(StatusArgs),
}

impl Commands {
    /// Only `run --execute` talks to the remote service.
    pub fn is_dry_run(&self) -> Option<bool> {
        match self {
            Self::Run(args) => Some(!args.execute),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct StageArgs {
    /// Customer partition the candidates belong to
    #[arg(long)]
    pub customer: String,

    /// JSON file holding an array of candidate records
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Only run batches for this customer
    #[arg(long)]
    pub customer: Option<String>,

    /// Run a single batch
    #[arg(long, conflicts_with = "customer")]
    pub batch: Option<String>,

    /// Actually send mutations (default is a dry run)
    #[arg(long)]
    pub execute: bool,

    /// Records per initial request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Concurrent requests in flight
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Retries after the first attempt, for a single record or a
    /// rate-limited request (0 disables retrying)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    pub report_json: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show batches for this customer
    #[arg(long)]
    pub customer: Option<String>,

    /// Number of batches to show
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}
