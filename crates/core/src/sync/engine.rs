//! Sync engine - orchestrates staging, dispatch, fallback and promotion

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use stagesync_common::retry::sleep_or_cancel;
use stagesync_domain::constants::MIXED_BATCH_TYPE;
use stagesync_domain::{
    Batch, BatchStatus, CandidateRecord, EngineConfig, FailureKind, NewStagedRecord, Result,
    StageSyncError, StagedRecord, StatusCounts,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::builder::BatchBuilder;
use super::fallback::{FallbackController, SliceReport};
use super::ports::{BatchRepository, ChangeDetector, MutationClient, ProductionStore, StagingStore};
use super::promotion::{PromotionReport, Promoter};

/// Result of running one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub customer_key: String,
    pub status: BatchStatus,
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Records left `PENDING`/`IN_FLIGHT` for a later run.
    pub unresolved: u32,
    pub promoted: u32,
    /// Network calls issued, or that would be issued in a dry run.
    pub requests: u32,
    pub error_summary: Option<String>,
    pub dry_run: bool,
    /// Batch-level error that stopped this batch.
    pub error: Option<String>,
}

impl BatchOutcome {
    fn from_batch(batch: &Batch) -> Self {
        Self {
            batch_id: batch.batch_id.clone(),
            customer_key: batch.customer_key.clone(),
            status: batch.status,
            total: batch.total_records,
            succeeded: batch.successful_records,
            failed: batch.failed_records,
            unresolved: batch.unresolved_records(),
            promoted: 0,
            requests: 0,
            error_summary: batch.error_summary.clone(),
            dry_run: false,
            error: None,
        }
    }

    fn errored(batch: &Batch, err: &StageSyncError) -> Self {
        Self {
            status: BatchStatus::Failed,
            error: Some(err.to_string()),
            ..Self::from_batch(batch)
        }
    }
}

/// Aggregate result of a run across batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<BatchOutcome>,
    /// Failures not attributable to a single batch (e.g. a panicked task).
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl RunReport {
    pub fn total_succeeded(&self) -> u32 {
        self.outcomes.iter().map(|o| o.succeeded).sum()
    }

    pub fn total_failed(&self) -> u32 {
        self.outcomes.iter().map(|o| o.failed).sum()
    }

    pub fn total_unresolved(&self) -> u32 {
        self.outcomes.iter().map(|o| o.unresolved).sum()
    }

    /// Any record ended terminally failed, or any batch failed.
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self.outcomes.iter().any(|o| o.failed > 0 || o.status == BatchStatus::Failed)
    }

    /// `0` on full success, `1` when anything failed, `2` when work was left
    /// unfinished (e.g. cancelled) without failures.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else if self.cancelled || self.total_unresolved() > 0 {
            2
        } else {
            0
        }
    }
}

/// Batch plus live per-status row counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSnapshot {
    pub batch: Batch,
    pub counts: StatusCounts,
}

/// Staging-based batch synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    staging: Arc<dyn StagingStore>,
    batches: Arc<dyn BatchRepository>,
    production: Arc<dyn ProductionStore>,
    client: Arc<dyn MutationClient>,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Create a new engine. `cancel` is owned by the caller; cancelling it
    /// stops new dispatch and skips retries.
    pub fn new(
        staging: Arc<dyn StagingStore>,
        batches: Arc<dyn BatchRepository>,
        production: Arc<dyn ProductionStore>,
        client: Arc<dyn MutationClient>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
        Self { staging, batches, production, client, config, permits, cancel }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn promoter(&self) -> Promoter {
        Promoter::new(
            Arc::clone(&self.staging),
            Arc::clone(&self.production),
            Arc::clone(&self.batches),
            self.config.retain_failed,
            self.config.error_summary_limit,
        )
    }

    /// Stage change-detector output as a new `STARTED` batch of `PENDING`
    /// records. No candidates, no batch.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn stage(
        &self,
        customer_key: &str,
        candidates: Vec<CandidateRecord>,
    ) -> Result<Option<Batch>> {
        if candidates.is_empty() {
            debug!("nothing to stage");
            return Ok(None);
        }

        let operations: HashSet<_> = candidates.iter().map(|c| c.operation).collect();
        let batch_type = match operations.iter().next() {
            Some(operation) if operations.len() == 1 => operation.as_str(),
            _ => MIXED_BATCH_TYPE,
        };

        let mut batch = Batch::new(customer_key, batch_type);
        self.batches.create(&batch).await?;

        let records: Vec<NewStagedRecord> = candidates
            .into_iter()
            .map(|candidate| candidate.into_staged(&batch.batch_id, customer_key))
            .collect();

        let inserted = match self.staging.insert(&records).await {
            Ok(ids) => ids.len(),
            Err(err) => {
                error!(batch_id = %batch.batch_id, error = %err, "staging insert failed");
                let reason = store_failure_reason(&err);
                if let Err(abort_err) = self.promoter().abort(&batch.batch_id, &reason).await {
                    error!(error = %abort_err, "could not mark batch failed");
                }
                return Err(err);
            }
        };

        batch.total_records = u32::try_from(inserted).unwrap_or(u32::MAX);
        self.batches.set_total(&batch.batch_id, batch.total_records).await?;
        info!(batch_id = %batch.batch_id, batch_type, records = inserted, "batch staged");
        Ok(Some(batch))
    }

    /// Ask `detector` for new candidates and stage them.
    pub async fn detect_and_stage(
        &self,
        detector: &dyn ChangeDetector,
        customer_key: &str,
    ) -> Result<Option<Batch>> {
        let candidates = detector.detect(customer_key).await?;
        self.stage(customer_key, candidates).await
    }

    /// Run one batch to a per-record outcome, promote its successes and
    /// finalize it.
    ///
    /// The run first claims the batch exclusively; a batch another live run
    /// holds is skipped untouched and reported with its unresolved records.
    /// A batch-level error (store unavailable, invalid configuration) marks
    /// the batch `FAILED`; the returned outcome carries the error. An already
    /// terminal batch only gets a promotion pass for leftovers.
    #[instrument(skip(self))]
    pub async fn run_batch(&self, batch_id: &str) -> Result<BatchOutcome> {
        let batch = self
            .batches
            .get(batch_id)
            .await?
            .ok_or_else(|| StageSyncError::NotFound(format!("batch {batch_id}")))?;

        if self.config.dry_run {
            return self.simulate(&batch).await;
        }

        if batch.status.is_terminal() {
            let promotion = self.promoter().promote(batch_id).await?;
            debug!(status = %batch.status, "batch already terminal");
            return Ok(BatchOutcome { promoted: promotion.promoted, ..BatchOutcome::from_batch(&batch) });
        }

        let owner = Uuid::new_v4().to_string();
        if !self.batches.claim(batch_id, &owner, self.config.claim_lease()).await? {
            warn!("batch is claimed by another run, skipping");
            let counts = self.staging.count_by_status(batch_id).await?;
            let current = self.batches.get(batch_id).await?.unwrap_or(batch);
            return Ok(BatchOutcome {
                unresolved: counts.unresolved(),
                ..BatchOutcome::from_batch(&current)
            });
        }

        match self.process(&batch, &owner).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(error = %err, "batch aborted");
                let reason = if err.is_store_failure() {
                    store_failure_reason(&err)
                } else {
                    err.to_string()
                };
                let failed = self.promoter().abort(batch_id, &reason).await.map_err(|abort_err| {
                    error!(error = %abort_err, "could not mark batch failed");
                    err.clone()
                })?;
                Ok(BatchOutcome::errored(&failed, &err))
            }
        }
    }

    /// Report what a run would do without calling the remote or writing.
    async fn simulate(&self, batch: &Batch) -> Result<BatchOutcome> {
        let pending = self.staging.fetch_pending(&batch.batch_id).await?;
        let counts = self.staging.count_by_status(&batch.batch_id).await?;
        let would_succeed = counts.unresolved();
        let requests = BatchBuilder::new(self.config.initial_batch_size).build(pending).len();

        info!(
            batch_id = %batch.batch_id,
            records = would_succeed,
            requests,
            "dry run: no requests sent"
        );

        Ok(BatchOutcome {
            succeeded: batch.successful_records.saturating_add(would_succeed),
            unresolved: 0,
            requests: u32::try_from(requests).unwrap_or(u32::MAX),
            dry_run: true,
            ..BatchOutcome::from_batch(batch)
        })
    }

    async fn process(&self, batch: &Batch, owner: &str) -> Result<BatchOutcome> {
        self.config.validate()?;
        let controller = FallbackController::new(
            Arc::clone(&self.client),
            Arc::clone(&self.staging),
            Arc::clone(&self.batches),
            &self.config,
            self.cancel.clone(),
        )?;
        let batch_id = batch.batch_id.as_str();

        let requeued = self.staging.requeue_in_flight(batch_id).await?;
        if requeued > 0 {
            info!(requeued, "requeued records left in flight by an interrupted run");
        }

        let pending = self.staging.fetch_pending(batch_id).await?;
        let pending_count = u32::try_from(pending.len()).unwrap_or(u32::MAX);
        self.batches
            .set_total(batch_id, batch.resolved_records().saturating_add(pending_count))
            .await?;

        let slices = BatchBuilder::new(self.config.initial_batch_size).build(pending);
        info!(records = pending_count, slices = slices.len(), "dispatching batch");

        let report = self.dispatch(&controller, batch_id, owner, slices).await?;
        let promotion = self.promoter().promote(batch_id).await?;

        let counts = self.staging.count_by_status(batch_id).await?;
        let current = if counts.unresolved() == 0 {
            self.promoter().finalize(batch_id, &report.failure_reasons).await?
        } else {
            info!(unresolved = counts.unresolved(), "batch left open for the next run");
            self.batches.release(batch_id, owner).await?;
            self.batches
                .get(batch_id)
                .await?
                .ok_or_else(|| StageSyncError::NotFound(format!("batch {batch_id}")))?
        };

        Ok(outcome_for(&current, &report, promotion, counts))
    }

    /// Dispatch slices in groups of `max_concurrent_batches`, pausing
    /// `inter_batch_delay` between groups and renewing the claim before each.
    /// Stops dispatching after the first store error, on cancellation or once
    /// the claim is lost; slices already running finish.
    async fn dispatch(
        &self,
        controller: &FallbackController,
        batch_id: &str,
        owner: &str,
        slices: Vec<Vec<StagedRecord>>,
    ) -> Result<SliceReport> {
        let group_size = self.config.max_concurrent_batches.max(1);
        let mut report = SliceReport::default();
        let mut failure: Option<StageSyncError> = None;
        let mut slices = slices.into_iter().peekable();
        let mut group_index = 0_usize;

        while slices.peek().is_some() {
            let group: Vec<_> = slices.by_ref().take(group_size).collect();
            let skip = failure.is_some()
                || self.cancel.is_cancelled()
                || (group_index > 0
                    && !sleep_or_cancel(self.config.inter_batch_delay(), &self.cancel).await)
                || !self.renew_claim(batch_id, owner, &mut failure).await;
            group_index += 1;

            if skip {
                let left: usize = group.iter().map(Vec::len).sum();
                report.unresolved += u32::try_from(left).unwrap_or(u32::MAX);
                continue;
            }

            let mut tasks = JoinSet::new();
            for slice in group {
                let controller = controller.clone();
                let permits = Arc::clone(&self.permits);
                let batch_id = batch_id.to_string();
                tasks.spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Ok(SliceReport {
                            unresolved: u32::try_from(slice.len()).unwrap_or(u32::MAX),
                            ..SliceReport::default()
                        });
                    };
                    controller.process_slice(&batch_id, slice).await
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(slice_report)) => report.merge(slice_report),
                    Ok(Err(err)) => {
                        error!(error = %err, "slice aborted");
                        failure.get_or_insert(err);
                    }
                    Err(join_err) => {
                        error!(error = %join_err, "slice task failed");
                        failure.get_or_insert(StageSyncError::Internal(format!(
                            "slice task failed: {join_err}"
                        )));
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Extend this run's lease on the batch. `false` once the claim is lost
    /// or the store fails, with the store error kept in `failure`.
    async fn renew_claim(
        &self,
        batch_id: &str,
        owner: &str,
        failure: &mut Option<StageSyncError>,
    ) -> bool {
        match self.batches.claim(batch_id, owner, self.config.claim_lease()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("batch claim lost, no further dispatch");
                false
            }
            Err(err) => {
                error!(error = %err, "could not renew batch claim");
                failure.get_or_insert(err);
                false
            }
        }
    }

    /// Run every open batch, optionally for one customer. Batches run
    /// concurrently; the shared permit pool bounds in-flight requests. One
    /// batch failing does not stop the others.
    #[instrument(skip(self))]
    pub async fn run_partitions(&self, customer_filter: Option<&str>) -> Result<RunReport> {
        let open = self.batches.list_open(customer_filter).await?;
        let mut report = RunReport { dry_run: self.config.dry_run, ..RunReport::default() };
        if open.is_empty() {
            info!("no open batches");
            return Ok(report);
        }
        info!(batches = open.len(), dry_run = self.config.dry_run, "running open batches");

        let mut tasks = JoinSet::new();
        for batch in open {
            let engine = self.clone();
            tasks.spawn(async move {
                let result = engine.run_batch(&batch.batch_id).await;
                (batch, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.outcomes.push(outcome),
                Ok((batch, Err(err))) => {
                    error!(batch_id = %batch.batch_id, error = %err, "batch run failed");
                    report.outcomes.push(BatchOutcome::errored(&batch, &err));
                }
                Err(join_err) => {
                    error!(error = %join_err, "batch task failed");
                    report.errors.push(format!("batch task failed: {join_err}"));
                }
            }
        }

        report.outcomes.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
        report.cancelled = self.cancel.is_cancelled();
        info!(
            succeeded = report.total_succeeded(),
            failed = report.total_failed(),
            unresolved = report.total_unresolved(),
            "run complete"
        );
        Ok(report)
    }

    /// Promotion pass on its own, for resuming after a crash.
    pub async fn promote(&self, batch_id: &str) -> Result<PromotionReport> {
        self.promoter().promote(batch_id).await
    }

    /// Recent batches with live row counts.
    pub async fn status(
        &self,
        customer_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BatchSnapshot>> {
        let mut snapshots = Vec::new();
        for batch in self.batches.list_recent(customer_filter, limit).await? {
            let counts = self.staging.count_by_status(&batch.batch_id).await?;
            snapshots.push(BatchSnapshot { batch, counts });
        }
        Ok(snapshots)
    }
}

fn store_failure_reason(err: &StageSyncError) -> String {
    format!("{}: {err}", FailureKind::StagingStore.code())
}

fn outcome_for(
    batch: &Batch,
    report: &SliceReport,
    promotion: PromotionReport,
    counts: StatusCounts,
) -> BatchOutcome {
    BatchOutcome {
        unresolved: counts.unresolved(),
        promoted: promotion.promoted,
        requests: report.requests,
        ..BatchOutcome::from_batch(batch)
    }
}
