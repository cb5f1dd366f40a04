//! StageSync CLI
//!
//! Stages detected changes, runs open batches against the remote service and
//! reports batch status.
//!
//! # Commands
//!
//! - `stage` - Detect candidates from an export file and stage them as a batch
//! - `run` - Run open batches (dry run unless `--execute`)
//! - `status` - Show recent batches with live per-status counts

mod cli;
mod commands;
mod context;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) => tracing::debug!(error = %e, "no .env file loaded"),
    }

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = context::load_config(&cli)?;
    let ctx = context::AppContext::new(config, cli.command.is_dry_run())?;

    let code = match cli.command {
        Commands::Stage(args) => commands::stage::run(&ctx, &args).await?,
        Commands::Run(args) => commands::run::run(&ctx, &args).await?,
        Commands::Status(args) => commands::status::run(&ctx, &args).await?,
    };
    Ok(ExitCode::from(code))
}
