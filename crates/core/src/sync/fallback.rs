//! Retry/fallback controller.
//!
//! Submits one slice of staged records and drives every record to a
//! per-record outcome:
//!
//! 1. The slice goes out as one request at the current ladder size.
//! 2. A whole-request failure that could be caused by a single record or by
//!    the request size (network errors, timeouts, transient server errors,
//!    validation) shrinks the request to the next smaller ladder size and
//!    resubmits only the records that are still unresolved.
//! 3. A rate-limited request is resubmitted unchanged after backoff, up to
//!    `max_retries` times, then its records are marked `API_FAILED`.
//! 4. At size 1 a retryable failure is retried with exponential backoff up to
//!    `max_retries` times, then the record is marked `API_FAILED`.
//!
//! Non-retryable per-alias failures settle immediately and never affect the
//! other records of the request. Records whose retries are interrupted by
//! cancellation stay `IN_FLIGHT` for the next run to requeue.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use stagesync_common::retry::{sleep_or_cancel, BackoffStrategy};
use stagesync_domain::{
    alias_for, AttemptOutcome, EngineConfig, FailureKind, MutationError, MutationRequest,
    MutationResult, Result, StageSyncError, StagedRecord, StagedStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::builder::BatchBuilder;
use super::ports::{BatchRepository, MutationClient, StagingStore};

/// Outcome tally for one processed slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceReport {
    pub succeeded: u32,
    pub failed: u32,
    /// Records left `PENDING`/`IN_FLIGHT` because the run was cancelled.
    pub unresolved: u32,
    /// Network calls issued.
    pub requests: u32,
    /// `"record <id>: CODE: message"` in the order failures settled.
    pub failure_reasons: Vec<String>,
}

impl SliceReport {
    pub fn merge(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.unresolved += other.unresolved;
        self.requests += other.requests;
        self.failure_reasons.extend(other.failure_reasons);
    }

    fn leave_unresolved(&mut self, count: usize) {
        self.unresolved += u32::try_from(count).unwrap_or(u32::MAX);
    }
}

enum Settlement {
    Success(String),
    Failed(String),
}

type LevelFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Drives slices through the fallback ladder.
#[derive(Clone)]
pub struct FallbackController {
    client: Arc<dyn MutationClient>,
    staging: Arc<dyn StagingStore>,
    batches: Arc<dyn BatchRepository>,
    backoff: BackoffStrategy,
    ladder: Vec<usize>,
    sub_batch_delay: Duration,
    cancel: CancellationToken,
}

impl FallbackController {
    pub fn new(
        client: Arc<dyn MutationClient>,
        staging: Arc<dyn StagingStore>,
        batches: Arc<dyn BatchRepository>,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let backoff = BackoffStrategy::custom(
            config.max_retries,
            config.base_delay(),
            config.max_delay(),
            config.backoff_multiplier,
        )
        .map_err(|e| StageSyncError::Config(e.to_string()))?
        .with_jitter_fraction(config.jitter_fraction);

        Ok(Self {
            client,
            staging,
            batches,
            backoff,
            ladder: config.ladder(),
            sub_batch_delay: config.sub_batch_delay(),
            cancel,
        })
    }

    pub fn ladder(&self) -> &[usize] {
        &self.ladder
    }

    /// Claim and process one slice.
    ///
    /// Only records this call moves from `PENDING` to `IN_FLIGHT` are
    /// submitted. Any staging or batch store error is returned and aborts the
    /// slice; outcomes already settled stay settled.
    #[instrument(skip_all, fields(batch_id = %batch_id, records = slice.len()))]
    pub async fn process_slice(
        &self,
        batch_id: &str,
        slice: Vec<StagedRecord>,
    ) -> Result<SliceReport> {
        let mut report = SliceReport::default();
        if slice.is_empty() {
            return Ok(report);
        }
        if self.cancel.is_cancelled() {
            report.leave_unresolved(slice.len());
            return Ok(report);
        }

        let ids: Vec<i64> = slice.iter().map(|record| record.id).collect();
        let claimed: HashSet<i64> = self.staging.mark_in_flight(&ids).await?.into_iter().collect();
        if claimed.len() < ids.len() {
            warn!(
                requested = ids.len(),
                claimed = claimed.len(),
                "some records were no longer pending; skipping them"
            );
        }

        let owned: Vec<StagedRecord> = slice
            .into_iter()
            .filter(|record| claimed.contains(&record.id))
            .map(|mut record| {
                record.status = StagedStatus::InFlight;
                record
            })
            .collect();

        self.run_level(batch_id, owned, 0, &mut report).await?;

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            unresolved = report.unresolved,
            requests = report.requests,
            "slice processed"
        );
        Ok(report)
    }

    fn size_at(&self, level: usize) -> usize {
        self.ladder.get(level).copied().unwrap_or(1)
    }

    /// First ladder level below `level` whose size is smaller than `len`.
    fn next_level(&self, level: usize, len: usize) -> usize {
        (level + 1..self.ladder.len())
            .find(|&candidate| self.ladder[candidate] < len)
            .unwrap_or(self.ladder.len().saturating_sub(1))
    }

    fn run_level<'a>(
        &'a self,
        batch_id: &'a str,
        records: Vec<StagedRecord>,
        level: usize,
        report: &'a mut SliceReport,
    ) -> LevelFuture<'a> {
        Box::pin(async move {
            let size = self.size_at(level);
            if records.len() == 1 || size <= 1 {
                for record in records {
                    if self.cancel.is_cancelled() {
                        report.leave_unresolved(1);
                        continue;
                    }
                    self.submit_individually(batch_id, record, report).await?;
                }
                return Ok(());
            }

            let chunks = BatchBuilder::new(size).build(records);
            for (index, chunk) in chunks.into_iter().enumerate() {
                if index > 0
                    && level > 0
                    && !sleep_or_cancel(self.sub_batch_delay, &self.cancel).await
                {
                    report.leave_unresolved(chunk.len());
                    continue;
                }
                if self.cancel.is_cancelled() {
                    report.leave_unresolved(chunk.len());
                    continue;
                }
                self.submit_chunk(batch_id, chunk, level, report).await?;
            }
            Ok(())
        })
    }

    /// Whole-request failures of these kinds are retried at a smaller size.
    /// Validation and not-found errors shrink to isolate the culprit record.
    fn shrinks_on(kind: FailureKind) -> bool {
        kind.is_size_suspicious() || matches!(kind, FailureKind::Validation | FailureKind::NotFound)
    }

    async fn submit_chunk(
        &self,
        batch_id: &str,
        mut chunk: Vec<StagedRecord>,
        level: usize,
        report: &mut SliceReport,
    ) -> Result<()> {
        let request = MutationRequest::from_records(&chunk);
        let mut throttled = 0_u32;

        loop {
            report.requests += 1;
            let err = match self.client.submit(&request).await {
                Ok(result) => {
                    return self.apply_result(batch_id, &request, chunk, &result, report).await;
                }
                Err(err) => err,
            };

            if err.kind() == FailureKind::RateLimit {
                let reason = err.to_error_message();
                if !self.backoff.should_retry(throttled) {
                    warn!(
                        size = chunk.len(),
                        attempts = throttled + 1,
                        "rate limit persisted; retries exhausted"
                    );
                    return self.settle(batch_id, fail_all(&chunk, &reason), report).await;
                }

                let delay = self.backoff.delay_for(throttled);
                throttled += 1;
                for record in &mut chunk {
                    record.retry_count = record.retry_count.saturating_add(1);
                    self.staging.record_retry(record.id, record.retry_count, &reason).await?;
                }
                warn!(
                    size = chunk.len(),
                    attempt = throttled,
                    delay_ms = delay.as_millis() as u64,
                    "request rate limited; resubmitting after backoff"
                );
                if !sleep_or_cancel(delay, &self.cancel).await {
                    report.leave_unresolved(chunk.len());
                    return Ok(());
                }
                continue;
            }

            if Self::shrinks_on(err.kind()) {
                let next = self.next_level(level, chunk.len());
                warn!(
                    kind = %err.kind(),
                    size = chunk.len(),
                    next_size = self.size_at(next),
                    error = %err,
                    "request failed; shrinking batch"
                );
                return self.run_level(batch_id, chunk, next, report).await;
            }

            warn!(kind = %err.kind(), size = chunk.len(), error = %err, "request rejected");
            return self.settle(batch_id, fail_all(&chunk, &err.to_error_message()), report).await;
        }
    }

    /// Settle the aliases a request answered; transient alias failures are
    /// retried one record at a time.
    async fn apply_result(
        &self,
        batch_id: &str,
        request: &MutationRequest,
        chunk: Vec<StagedRecord>,
        result: &MutationResult,
        report: &mut SliceReport,
    ) -> Result<()> {
        let mut settlements = Vec::with_capacity(chunk.len());
        let mut retry_individually = Vec::new();
        for (operation, record) in request.operations.iter().zip(chunk) {
            match result.outcome_for(&operation.alias) {
                AttemptOutcome::Success(external_id) => {
                    settlements.push((record.id, Settlement::Success(external_id)));
                }
                AttemptOutcome::Fatal(err) => {
                    settlements.push((record.id, Settlement::Failed(err.to_error_message())));
                }
                AttemptOutcome::Retryable(err) => {
                    debug!(
                        record_id = record.id,
                        alias = %operation.alias,
                        kind = %err.kind(),
                        "sub-operation failed transiently; retrying individually"
                    );
                    retry_individually.push(record);
                }
            }
        }
        self.settle(batch_id, settlements, report).await?;

        for record in retry_individually {
            if self.cancel.is_cancelled() {
                report.leave_unresolved(1);
                continue;
            }
            self.submit_individually(batch_id, record, report).await?;
        }
        Ok(())
    }

    async fn submit_individually(
        &self,
        batch_id: &str,
        record: StagedRecord,
        report: &mut SliceReport,
    ) -> Result<()> {
        let request = MutationRequest::from_records(std::slice::from_ref(&record));
        let alias = alias_for(0);
        let mut retries = 0_u32;

        loop {
            report.requests += 1;
            let outcome = match self.client.submit(&request).await {
                Ok(result) => result.outcome_for(&alias),
                Err(err) => AttemptOutcome::from_result(Err(err)),
            };

            let err: MutationError = match outcome {
                AttemptOutcome::Success(external_id) => {
                    return self
                        .settle(batch_id, vec![(record.id, Settlement::Success(external_id))], report)
                        .await;
                }
                AttemptOutcome::Fatal(err) => {
                    return self
                        .settle(
                            batch_id,
                            vec![(record.id, Settlement::Failed(err.to_error_message()))],
                            report,
                        )
                        .await;
                }
                AttemptOutcome::Retryable(err) => err,
            };

            let reason = err.to_error_message();
            if !self.backoff.should_retry(retries) {
                warn!(
                    record_id = record.id,
                    attempts = retries + 1,
                    kind = %err.kind(),
                    "retries exhausted"
                );
                return self.settle(batch_id, vec![(record.id, Settlement::Failed(reason))], report).await;
            }

            let delay = self.backoff.delay_for(retries);
            retries += 1;
            self.staging
                .record_retry(record.id, record.retry_count.saturating_add(retries), &reason)
                .await?;
            debug!(
                record_id = record.id,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                kind = %err.kind(),
                "retrying record after backoff"
            );

            if !sleep_or_cancel(delay, &self.cancel).await {
                report.leave_unresolved(1);
                return Ok(());
            }
        }
    }

    /// Mark each record and count it on the batch right away, so a store
    /// error part way through leaves every marked row counted.
    async fn settle(
        &self,
        batch_id: &str,
        settlements: Vec<(i64, Settlement)>,
        report: &mut SliceReport,
    ) -> Result<()> {
        for (id, settlement) in settlements {
            match settlement {
                Settlement::Success(external_id) => {
                    if !self.staging.mark_success(id, &external_id).await? {
                        warn!(record_id = id, "success not recorded; record was not in flight");
                        continue;
                    }
                    self.batches.increment_counters(batch_id, 1, 0).await?;
                    report.succeeded += 1;
                    debug!(record_id = id, external_id = %external_id, "record synced");
                }
                Settlement::Failed(reason) => {
                    if !self.staging.mark_failed(id, &reason).await? {
                        warn!(record_id = id, "failure not recorded; record was not in flight");
                        continue;
                    }
                    self.batches.increment_counters(batch_id, 0, 1).await?;
                    report.failed += 1;
                    debug!(record_id = id, reason = %reason, "record failed");
                    report.failure_reasons.push(format!("record {id}: {reason}"));
                }
            }
        }
        Ok(())
    }
}

fn fail_all(chunk: &[StagedRecord], reason: &str) -> Vec<(i64, Settlement)> {
    chunk.iter().map(|record| (record.id, Settlement::Failed(reason.to_string()))).collect()
}
