//! Promotion/cleanup: move synced records into production and close batches

use std::sync::Arc;

use stagesync_domain::constants::ERROR_SUMMARY_SEPARATOR;
use stagesync_domain::{truncate_reason, Batch, BatchStatus, Result, StageSyncError, StagedStatus};
use tracing::{debug, info, instrument, warn};

use super::ports::{BatchRepository, ProductionStore, StagingStore};

/// Rows touched by one promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionReport {
    /// Staged rows moved to `PROMOTED` in this pass.
    pub promoted: u32,
    /// Production rows created in this pass.
    pub copied: u32,
    /// Staged rows deleted in this pass.
    pub purged: u32,
}

pub struct Promoter {
    staging: Arc<dyn StagingStore>,
    production: Arc<dyn ProductionStore>,
    batches: Arc<dyn BatchRepository>,
    retain_failed: bool,
    summary_limit: usize,
}

impl Promoter {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        production: Arc<dyn ProductionStore>,
        batches: Arc<dyn BatchRepository>,
        retain_failed: bool,
        summary_limit: usize,
    ) -> Self {
        Self { staging, production, batches, retain_failed, summary_limit }
    }

    /// Copy every `API_SUCCESS` row of the batch into production, mark it
    /// `PROMOTED`, then purge promoted rows (and failed rows unless they are
    /// retained for triage).
    ///
    /// Proceeds record by record. Re-running after a crash is safe: the
    /// production copy is keyed by staged id and already-promoted rows are
    /// only purged.
    #[instrument(skip(self))]
    pub async fn promote(&self, batch_id: &str) -> Result<PromotionReport> {
        let mut report = PromotionReport::default();

        for record in self.staging.fetch_succeeded(batch_id).await? {
            let Some(external_id) = record.external_id.as_deref() else {
                warn!(record_id = record.id, "succeeded record has no external id; skipping");
                continue;
            };

            if self.production.record_synced(&record, external_id).await? {
                report.copied += 1;
            } else {
                debug!(record_id = record.id, "production row already present");
            }
            report.promoted += u32::try_from(self.staging.promote(&[record.id]).await?)
                .unwrap_or(u32::MAX);
        }

        let mut purge_ids: Vec<i64> = self
            .staging
            .fetch_by_status(batch_id, StagedStatus::Promoted)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();
        if !self.retain_failed {
            purge_ids.extend(self.staging.fetch_failed(batch_id).await?.into_iter().map(|r| r.id));
        }
        if !purge_ids.is_empty() {
            report.purged = u32::try_from(self.staging.purge(&purge_ids).await?).unwrap_or(u32::MAX);
        }

        info!(
            promoted = report.promoted,
            copied = report.copied,
            purged = report.purged,
            "promotion pass complete"
        );
        Ok(report)
    }

    /// Close the batch with a status derived from its counters.
    ///
    /// `failure_reasons` feeds the `error_summary`; when empty, any existing
    /// summary is kept.
    #[instrument(skip(self, failure_reasons))]
    pub async fn finalize(&self, batch_id: &str, failure_reasons: &[String]) -> Result<Batch> {
        let batch = self.load(batch_id).await?;
        let failed = batch.total_records.saturating_sub(batch.successful_records);
        let status = BatchStatus::from_counts(batch.successful_records, failed);
        let summary = self.summarize(failure_reasons);

        self.batches.finalize(batch_id, status, summary.as_deref()).await?;
        info!(status = %status, successful = batch.successful_records, failed, "batch finalized");
        self.load(batch_id).await
    }

    /// Close the batch as `FAILED` after a batch-level error. Records without
    /// an outcome are counted as failed.
    #[instrument(skip(self, reason))]
    pub async fn abort(&self, batch_id: &str, reason: &str) -> Result<Batch> {
        let summary = truncate_reason(reason);
        self.batches.finalize(batch_id, BatchStatus::Failed, Some(&summary)).await?;
        warn!(reason = %summary, "batch aborted");
        self.load(batch_id).await
    }

    /// First `summary_limit` reasons joined for the batch `error_summary`.
    pub fn summarize(&self, failure_reasons: &[String]) -> Option<String> {
        if failure_reasons.is_empty() || self.summary_limit == 0 {
            return None;
        }
        let mut summary = failure_reasons
            .iter()
            .take(self.summary_limit)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(ERROR_SUMMARY_SEPARATOR);
        let hidden = failure_reasons.len().saturating_sub(self.summary_limit);
        if hidden > 0 {
            summary.push_str(&format!("{ERROR_SUMMARY_SEPARATOR}(+{hidden} more)"));
        }
        Some(summary)
    }

    async fn load(&self, batch_id: &str) -> Result<Batch> {
        self.batches
            .get(batch_id)
            .await?
            .ok_or_else(|| StageSyncError::NotFound(format!("batch {batch_id}")))
    }
}
