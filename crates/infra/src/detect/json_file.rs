//! Change detection over an exported JSON file.
//!
//! The file holds an array of already-mapped candidates. A candidate is
//! dropped when its business key is already in the production mirror for the
//! customer or still staged there (anything but a terminal failure), and when
//! the key repeats within the file (first occurrence wins).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use stagesync_core::{ChangeDetector, ProductionStore, StagingStore};
use stagesync_domain::{CandidateRecord, Result, StageSyncError};
use tracing::{debug, info, instrument};

/// [`ChangeDetector`] that reads candidates from a JSON export.
pub struct JsonFileDetector {
    path: PathBuf,
    staging: Arc<dyn StagingStore>,
    production: Arc<dyn ProductionStore>,
}

impl JsonFileDetector {
    pub fn new(
        path: impl Into<PathBuf>,
        staging: Arc<dyn StagingStore>,
        production: Arc<dyn ProductionStore>,
    ) -> Self {
        Self { path: path.into(), staging, production }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys that must not be staged again for `customer_key`.
    async fn known_keys(&self, customer_key: &str) -> Result<HashSet<String>> {
        let mut known: HashSet<String> =
            self.production.synced_business_keys(customer_key).await?.into_iter().collect();
        known.extend(self.staging.staged_business_keys(customer_key).await?);
        Ok(known)
    }
}

fn read_candidates(path: &Path) -> Result<Vec<CandidateRecord>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        StageSyncError::InvalidInput(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        StageSyncError::InvalidInput(format!("invalid candidate file {}: {e}", path.display()))
    })
}

#[async_trait]
impl ChangeDetector for JsonFileDetector {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn detect(&self, customer_key: &str) -> Result<Vec<CandidateRecord>> {
        let path = self.path.clone();
        let candidates = tokio::task::spawn_blocking(move || read_candidates(&path))
            .await
            .map_err(|e| StageSyncError::Internal(format!("detector task failed: {e}")))??;

        let mut seen = self.known_keys(customer_key).await?;
        let read = candidates.len();

        let fresh: Vec<CandidateRecord> = candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.business_key.clone()))
            .collect();

        debug!(read, skipped = read - fresh.len(), "filtered known candidates");
        info!(customer_key, candidates = fresh.len(), "change detection complete");
        Ok(fresh)
    }
}
