//! In-memory implementations of the storage ports.
//!
//! Transition guards mirror the SQL guards of the SQLite adapters so engine
//! tests exercise the same no-op semantics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagesync_core::{BatchRepository, ProductionStore, StagingStore};
use stagesync_domain::{
    Batch, BatchStatus, NewStagedRecord, Result as DomainResult, StageSyncError, StagedRecord,
    StagedStatus, StatusCounts,
};
use tokio::sync::Mutex;

#[derive(Default)]
struct StagingState {
    next_id: i64,
    rows: BTreeMap<i64, StagedRecord>,
    failing_batches: HashSet<String>,
    /// Outcome marks allowed before the store starts failing.
    mark_budget: Option<usize>,
}

/// In-memory `StagingStore`.
///
/// Writes touching a batch registered with [`MemoryStaging::fail_batch`]
/// return a `Database` error, simulating an unavailable durable store.
#[derive(Default)]
pub struct MemoryStaging {
    state: Mutex<StagingState>,
}

impl MemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_batch(&self, batch_id: &str) {
        self.state.lock().await.failing_batches.insert(batch_id.to_string());
    }

    /// Let `marks` outcome writes succeed, then fail every later one.
    pub async fn fail_marks_after(&self, marks: usize) {
        self.state.lock().await.mark_budget = Some(marks);
    }

    pub async fn get(&self, id: i64) -> Option<StagedRecord> {
        self.state.lock().await.rows.get(&id).cloned()
    }

    pub async fn rows(&self, batch_id: &str) -> Vec<StagedRecord> {
        self.state.lock().await.rows.values().filter(|r| r.batch_id == batch_id).cloned().collect()
    }

    /// Force a row into a status, bypassing transition guards.
    pub async fn force_status(&self, id: i64, status: StagedStatus, external_id: Option<&str>) {
        if let Some(row) = self.state.lock().await.rows.get_mut(&id) {
            row.status = status;
            row.external_id = external_id.map(str::to_string);
        }
    }
}

impl StagingState {
    fn check_writable(&self, batch_id: &str) -> DomainResult<()> {
        if self.failing_batches.contains(batch_id) {
            return Err(StageSyncError::Database(format!("staging store unavailable for {batch_id}")));
        }
        Ok(())
    }

    fn check_row(&self, id: i64) -> DomainResult<()> {
        match self.rows.get(&id) {
            Some(row) => self.check_writable(&row.batch_id),
            None => Ok(()),
        }
    }

    fn spend_mark(&mut self) -> DomainResult<()> {
        match self.mark_budget {
            Some(0) => Err(StageSyncError::Database("staging store went away".into())),
            Some(left) => {
                self.mark_budget = Some(left - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn transition(
        &mut self,
        id: i64,
        from: &[StagedStatus],
        apply: impl FnOnce(&mut StagedRecord),
    ) -> DomainResult<bool> {
        self.check_row(id)?;
        match self.rows.get_mut(&id) {
            Some(row) if from.contains(&row.status) => {
                apply(row);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StagingStore for MemoryStaging {
    async fn insert(&self, records: &[NewStagedRecord]) -> DomainResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        for record in records {
            state.check_writable(&record.batch_id)?;
        }

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            state.next_id += 1;
            let id = state.next_id;
            state.rows.insert(
                id,
                StagedRecord {
                    id,
                    batch_id: record.batch_id.clone(),
                    customer_key: record.customer_key.clone(),
                    business_key: record.business_key.clone(),
                    operation: record.operation,
                    target_id: record.target_id.clone(),
                    payload: record.payload.clone(),
                    status: StagedStatus::Pending,
                    external_id: None,
                    error_message: None,
                    retry_count: 0,
                    created_at: Utc::now(),
                    processed_at: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn fetch_by_status(
        &self,
        batch_id: &str,
        status: StagedStatus,
    ) -> DomainResult<Vec<StagedRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .rows
            .values()
            .filter(|r| r.batch_id == batch_id && r.status == status)
            .cloned()
            .collect())
    }

    async fn mark_in_flight(&self, ids: &[i64]) -> DomainResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        for id in ids {
            state.check_row(*id)?;
        }
        let mut claimed = Vec::new();
        for id in ids {
            if state.transition(*id, &[StagedStatus::Pending], |row| {
                row.status = StagedStatus::InFlight;
            })? {
                claimed.push(*id);
            }
        }
        Ok(claimed)
    }

    async fn mark_success(&self, id: i64, external_id: &str) -> DomainResult<bool> {
        let mut state = self.state.lock().await;
        state.spend_mark()?;
        state.transition(id, &[StagedStatus::InFlight], |row| {
            row.status = StagedStatus::ApiSuccess;
            row.external_id = Some(external_id.to_string());
            row.error_message = None;
            row.processed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> DomainResult<bool> {
        let mut state = self.state.lock().await;
        state.spend_mark()?;
        state.transition(id, &[StagedStatus::InFlight], |row| {
            row.status = StagedStatus::ApiFailed;
            row.error_message = Some(reason.to_string());
            row.processed_at = Some(Utc::now());
        })
    }

    async fn record_retry(&self, id: i64, retry_count: u32, reason: &str) -> DomainResult<bool> {
        self.state.lock().await.transition(id, &[StagedStatus::InFlight], |row| {
            row.retry_count = retry_count;
            row.error_message = Some(reason.to_string());
        })
    }

    async fn promote(&self, ids: &[i64]) -> DomainResult<usize> {
        let mut state = self.state.lock().await;
        let mut promoted = 0;
        for id in ids {
            if state.transition(*id, &[StagedStatus::ApiSuccess], |row| {
                row.status = StagedStatus::Promoted;
            })? {
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn purge(&self, ids: &[i64]) -> DomainResult<usize> {
        let mut state = self.state.lock().await;
        for id in ids {
            state.check_row(*id)?;
        }
        let mut purged = 0;
        for id in ids {
            let removable = state
                .rows
                .get(id)
                .is_some_and(|row| matches!(row.status, StagedStatus::Promoted | StagedStatus::ApiFailed));
            if removable {
                state.rows.remove(id);
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn requeue_in_flight(&self, batch_id: &str) -> DomainResult<usize> {
        let mut state = self.state.lock().await;
        state.check_writable(batch_id)?;
        let mut requeued = 0;
        for row in state.rows.values_mut() {
            if row.batch_id == batch_id && row.status == StagedStatus::InFlight {
                row.status = StagedStatus::Pending;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn count_by_status(&self, batch_id: &str) -> DomainResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for row in self.state.lock().await.rows.values().filter(|r| r.batch_id == batch_id) {
            counts.add(row.status, 1);
        }
        Ok(counts)
    }

    async fn staged_business_keys(&self, customer_key: &str) -> DomainResult<Vec<String>> {
        let keys: HashSet<String> = self
            .state
            .lock()
            .await
            .rows
            .values()
            .filter(|r| r.customer_key == customer_key && r.status != StagedStatus::ApiFailed)
            .map(|r| r.business_key.clone())
            .collect();
        Ok(keys.into_iter().collect())
    }
}

/// In-memory `BatchRepository` that counts conservation violations.
#[derive(Default)]
pub struct MemoryBatches {
    batches: Mutex<HashMap<String, Batch>>,
    /// Batch id -> (owner, lease expiry).
    claims: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    violations: AtomicUsize,
}

impl MemoryBatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current claim owner of a batch, expired or not.
    pub async fn claim_owner(&self, batch_id: &str) -> Option<String> {
        self.claims.lock().await.get(batch_id).map(|(owner, _)| owner.clone())
    }

    /// Plant a claim as if another run held the batch.
    pub async fn hold_claim(&self, batch_id: &str, owner: &str, lease: Duration) {
        let expires_at = Utc::now() + chrono::Duration::from_std(lease).unwrap();
        self.claims.lock().await.insert(batch_id.to_string(), (owner.to_string(), expires_at));
        self.update(batch_id, |batch| batch.status = BatchStatus::Processing).await.unwrap();
    }

    /// Number of writes after which a batch broke the conservation invariant.
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    fn observe(&self, batch: &Batch) {
        if !batch.is_conserved() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn update(&self, batch_id: &str, apply: impl FnOnce(&mut Batch)) -> DomainResult<()> {
        let mut batches = self.batches.lock().await;
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| StageSyncError::NotFound(format!("batch {batch_id}")))?;
        apply(batch);
        self.observe(batch);
        Ok(())
    }
}

#[async_trait]
impl BatchRepository for MemoryBatches {
    async fn create(&self, batch: &Batch) -> DomainResult<()> {
        self.batches.lock().await.insert(batch.batch_id.clone(), batch.clone());
        Ok(())
    }

    async fn get(&self, batch_id: &str) -> DomainResult<Option<Batch>> {
        Ok(self.batches.lock().await.get(batch_id).cloned())
    }

    async fn claim(&self, batch_id: &str, owner: &str, lease: Duration) -> DomainResult<bool> {
        let mut batches = self.batches.lock().await;
        let mut claims = self.claims.lock().await;
        let Some(batch) = batches.get_mut(batch_id) else {
            return Ok(false);
        };
        if batch.status.is_terminal() {
            return Ok(false);
        }
        let now = Utc::now();
        let free = claims
            .get(batch_id)
            .map_or(true, |(holder, expires_at)| holder == owner || *expires_at <= now);
        if !free {
            return Ok(false);
        }
        let expires_at = now + chrono::Duration::from_std(lease).unwrap();
        claims.insert(batch_id.to_string(), (owner.to_string(), expires_at));
        batch.status = BatchStatus::Processing;
        Ok(true)
    }

    async fn release(&self, batch_id: &str, owner: &str) -> DomainResult<()> {
        let mut claims = self.claims.lock().await;
        if claims.get(batch_id).is_some_and(|(holder, _)| holder == owner) {
            claims.remove(batch_id);
        }
        Ok(())
    }

    async fn set_total(&self, batch_id: &str, total: u32) -> DomainResult<()> {
        self.update(batch_id, |batch| {
            batch.total_records = total.max(batch.resolved_records());
        })
        .await
    }

    async fn increment_counters(
        &self,
        batch_id: &str,
        successes: u32,
        failures: u32,
    ) -> DomainResult<()> {
        self.update(batch_id, |batch| {
            let room = batch.total_records.saturating_sub(batch.resolved_records());
            let successes = successes.min(room);
            batch.successful_records += successes;
            batch.failed_records += failures.min(room - successes);
        })
        .await
    }

    async fn finalize(
        &self,
        batch_id: &str,
        status: BatchStatus,
        error_summary: Option<&str>,
    ) -> DomainResult<()> {
        self.claims.lock().await.remove(batch_id);
        self.update(batch_id, |batch| {
            batch.status = status;
            batch.failed_records = batch.total_records.saturating_sub(batch.successful_records);
            batch.end_time = Some(Utc::now());
            if let Some(summary) = error_summary {
                batch.error_summary = Some(summary.to_string());
            }
        })
        .await
    }

    async fn list_open(&self, customer_key: Option<&str>) -> DomainResult<Vec<Batch>> {
        let mut open: Vec<Batch> = self
            .batches
            .lock()
            .await
            .values()
            .filter(|b| !b.status.is_terminal())
            .filter(|b| customer_key.map_or(true, |key| b.customer_key == key))
            .cloned()
            .collect();
        open.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
        Ok(open)
    }

    async fn list_recent(&self, customer_key: Option<&str>, limit: usize) -> DomainResult<Vec<Batch>> {
        let mut recent: Vec<Batch> = self
            .batches
            .lock()
            .await
            .values()
            .filter(|b| customer_key.map_or(true, |key| b.customer_key == key))
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.batch_id.cmp(&a.batch_id));
        recent.truncate(limit);
        Ok(recent)
    }
}

/// In-memory production mirror keyed by staged id.
#[derive(Default)]
pub struct MemoryProduction {
    rows: Mutex<BTreeMap<i64, (StagedRecord, String)>>,
}

impl MemoryProduction {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn get(&self, staged_id: i64) -> Option<(StagedRecord, String)> {
        self.rows.lock().await.get(&staged_id).cloned()
    }

    pub async fn external_ids(&self) -> Vec<String> {
        self.rows.lock().await.values().map(|(_, external_id)| external_id.clone()).collect()
    }
}

#[async_trait]
impl ProductionStore for MemoryProduction {
    async fn record_synced(&self, record: &StagedRecord, external_id: &str) -> DomainResult<bool> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&record.id) {
            return Ok(false);
        }
        rows.insert(record.id, (record.clone(), external_id.to_string()));
        Ok(true)
    }

    async fn is_synced(&self, staged_id: i64) -> DomainResult<bool> {
        Ok(self.rows.lock().await.contains_key(&staged_id))
    }

    async fn synced_business_keys(&self, customer_key: &str) -> DomainResult<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|(record, _)| record.customer_key == customer_key)
            .map(|(record, _)| record.business_key.clone())
            .collect())
    }
}
