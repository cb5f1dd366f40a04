//! Wiring of adapters into a ready-to-use engine.

use std::sync::Arc;

use anyhow::Context as _;
use stagesync_core::{MutationClient, ProductionStore, StagingStore, SyncEngine};
use stagesync_domain::Config;
use stagesync_infra::config;
use stagesync_infra::database::{
    DbManager, SqlCipherBatchRepository, SqlCipherProductionStore, SqlCipherStagingStore,
};
use stagesync_infra::{DryRunMutationClient, GraphqlMutationClient};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, RunArgs};

/// Load configuration and apply command-line overrides.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::load_from_file(Some(path.clone()))?,
        None => config::load().context("no usable configuration found")?,
    };
    if let Commands::Run(args) = &cli.command {
        apply_overrides(&mut config, args);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    let engine = &mut config.engine;
    if let Some(size) = args.batch_size {
        engine.initial_batch_size = size;
    }
    if let Some(concurrency) = args.max_concurrent {
        engine.max_concurrent_batches = concurrency;
    }
    if let Some(retries) = args.max_retries {
        engine.max_retries = retries;
    }
    engine.dry_run = !args.execute;
}

/// Everything a command needs.
pub struct AppContext {
    pub config: Config,
    pub engine: SyncEngine,
    pub staging: Arc<dyn StagingStore>,
    pub production: Arc<dyn ProductionStore>,
    pub cancel: CancellationToken,
}

impl AppContext {
    /// Open the staging database and build the engine. `dry_run` of `None`
    /// keeps the configured mode; a dry run never builds the remote client.
    pub fn new(mut config: Config, dry_run: Option<bool>) -> anyhow::Result<Self> {
        if let Some(dry_run) = dry_run {
            config.engine.dry_run = dry_run;
        }

        let db = DbManager::from_config(&config.database)
            .with_context(|| format!("opening staging database {}", config.database.path))?;
        db.run_migrations().context("applying schema")?;
        let db = Arc::new(db);

        let client: Arc<dyn MutationClient> = if config.engine.dry_run {
            Arc::new(DryRunMutationClient)
        } else {
            Arc::new(GraphqlMutationClient::new(&config.remote).context("building remote client")?)
        };

        let staging: Arc<dyn StagingStore> = Arc::new(SqlCipherStagingStore::new(Arc::clone(&db)));
        let production: Arc<dyn ProductionStore> =
            Arc::new(SqlCipherProductionStore::new(Arc::clone(&db)));
        let cancel = CancellationToken::new();
        let engine = SyncEngine::new(
            Arc::clone(&staging),
            Arc::new(SqlCipherBatchRepository::new(Arc::clone(&db))),
            Arc::clone(&production),
            client,
            config.engine.clone(),
            cancel.clone(),
        );

        info!(db_path = %db.path().display(), dry_run = config.engine.dry_run, "engine ready");
        Ok(Self { config, engine, staging, production, cancel })
    }

    /// Cancel the engine on Ctrl-C. A second Ctrl-C is left to the default
    /// handler once the first has been seen.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        });
    }
}
