//! Port interfaces for staged synchronization

use std::time::Duration;

use async_trait::async_trait;
use stagesync_domain::{
    Batch, BatchStatus, CandidateRecord, MutationError, MutationRequest, MutationResult,
    NewStagedRecord, Result, StagedRecord, StagedStatus, StatusCounts,
};

/// Durable table of pending operations and their lifecycle status.
///
/// Every write is durable before the call returns. Status transitions are
/// guarded: a call that would not move a row along the lifecycle leaves it
/// untouched and reports `false` (or omits the id).
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Bulk-insert new `PENDING` rows, all or nothing. Returns assigned ids in
    /// input order.
    async fn insert(&self, records: &[NewStagedRecord]) -> Result<Vec<i64>>;

    /// Rows of a batch in the given status, ordered by id.
    async fn fetch_by_status(&self, batch_id: &str, status: StagedStatus)
        -> Result<Vec<StagedRecord>>;

    /// All `PENDING` rows of a batch, ordered by id.
    async fn fetch_pending(&self, batch_id: &str) -> Result<Vec<StagedRecord>> {
        self.fetch_by_status(batch_id, StagedStatus::Pending).await
    }

    /// All `API_SUCCESS` rows of a batch, ordered by id.
    async fn fetch_succeeded(&self, batch_id: &str) -> Result<Vec<StagedRecord>> {
        self.fetch_by_status(batch_id, StagedStatus::ApiSuccess).await
    }

    /// All terminal `API_FAILED` rows of a batch, ordered by id.
    async fn fetch_failed(&self, batch_id: &str) -> Result<Vec<StagedRecord>> {
        self.fetch_by_status(batch_id, StagedStatus::ApiFailed).await
    }

    /// Move `PENDING` rows to `IN_FLIGHT`. Returns the ids that actually
    /// transitioned; the caller owns exactly those.
    async fn mark_in_flight(&self, ids: &[i64]) -> Result<Vec<i64>>;

    /// `IN_FLIGHT -> API_SUCCESS` with the remote identifier.
    async fn mark_success(&self, id: i64, external_id: &str) -> Result<bool>;

    /// `IN_FLIGHT -> API_FAILED` (terminal) with the classified reason.
    async fn mark_failed(&self, id: i64, reason: &str) -> Result<bool>;

    /// Persist retry bookkeeping while the row stays `IN_FLIGHT`.
    async fn record_retry(&self, id: i64, retry_count: u32, reason: &str) -> Result<bool>;

    /// `API_SUCCESS -> PROMOTED`. Returns how many rows transitioned.
    async fn promote(&self, ids: &[i64]) -> Result<usize>;

    /// Delete `PROMOTED` or `API_FAILED` rows. Other statuses are kept.
    async fn purge(&self, ids: &[i64]) -> Result<usize>;

    /// Return rows left `IN_FLIGHT` by an interrupted run to `PENDING`.
    async fn requeue_in_flight(&self, batch_id: &str) -> Result<usize>;

    async fn count_by_status(&self, batch_id: &str) -> Result<StatusCounts>;

    /// Business keys a customer has staged in any status but `API_FAILED`.
    async fn staged_business_keys(&self, customer_key: &str) -> Result<Vec<String>>;
}

/// Operator-visible batch tracking.
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn create(&self, batch: &Batch) -> Result<()>;

    async fn get(&self, batch_id: &str) -> Result<Option<Batch>>;

    /// Take exclusive ownership of an open batch until `lease` elapses,
    /// moving it to `PROCESSING`.
    ///
    /// Succeeds when the batch is `STARTED`, or `PROCESSING` with no live
    /// claim held by another owner. Claiming again as the same owner renews
    /// the lease. Returns `false` for terminal or unknown batches and while
    /// another owner's lease is live.
    async fn claim(&self, batch_id: &str, owner: &str, lease: Duration) -> Result<bool>;

    /// Drop `owner`'s claim so the next run can take the batch at once.
    /// No-op when `owner` does not hold it.
    async fn release(&self, batch_id: &str, owner: &str) -> Result<()>;

    async fn set_total(&self, batch_id: &str, total: u32) -> Result<()>;

    /// Add to the outcome counters, clamped so `successful + failed` never
    /// exceeds `total`.
    async fn increment_counters(&self, batch_id: &str, successes: u32, failures: u32)
        -> Result<()>;

    /// Set a terminal status and end time. Records still unaccounted for are
    /// counted as failed. `None` keeps any existing summary.
    async fn finalize(
        &self,
        batch_id: &str,
        status: BatchStatus,
        error_summary: Option<&str>,
    ) -> Result<()>;

    /// Non-terminal batches, oldest first, optionally for one customer.
    async fn list_open(&self, customer_key: Option<&str>) -> Result<Vec<Batch>>;

    /// Most recent batches, newest first.
    async fn list_recent(&self, customer_key: Option<&str>, limit: usize) -> Result<Vec<Batch>>;
}

/// Production mirror of successfully synchronized records.
#[async_trait]
pub trait ProductionStore: Send + Sync {
    /// Copy a staged record into production. Keyed by staged id; copying the
    /// same record twice returns `false` and leaves a single row.
    async fn record_synced(&self, record: &StagedRecord, external_id: &str) -> Result<bool>;

    async fn is_synced(&self, staged_id: i64) -> Result<bool>;

    /// Business keys already mirrored for a customer.
    async fn synced_business_keys(&self, customer_key: &str) -> Result<Vec<String>>;
}

/// Remote mutation client: one network call per request.
#[async_trait]
pub trait MutationClient: Send + Sync {
    /// Submit every aliased sub-operation in one call.
    ///
    /// `Err` means the request failed wholesale and no alias could be read.
    async fn submit(
        &self,
        request: &MutationRequest,
    ) -> std::result::Result<MutationResult, MutationError>;
}

/// Source of authoritative records not yet mirrored downstream.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    async fn detect(&self, customer_key: &str) -> Result<Vec<CandidateRecord>>;
}
