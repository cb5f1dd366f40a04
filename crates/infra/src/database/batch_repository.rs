//! Batch repository implementation
//!
//! Tracks batch lifecycle and counters. Counter updates are clamped in SQL so
//! `successful + failed <= total` holds no matter how calls interleave.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use stagesync_core::BatchRepository;
use stagesync_domain::{Batch, BatchStatus, Result as DomainResult, StageSyncError};
use tracing::{debug, instrument};

use super::manager::{map_sql_error, DbManager};
use super::repository::{from_millis, parse_column, to_millis, to_u32, usize_to_i64, with_connection};

const BATCH_COLUMNS: &str = "batch_id, customer_key, batch_type, status, total_records,
    successful_records, failed_records, start_time, end_time, error_summary";

/// SqlCipher-based batch repository
pub struct SqlCipherBatchRepository {
    db: Arc<DbManager>,
}

impl SqlCipherBatchRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchRepository for SqlCipherBatchRepository {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    async fn create(&self, batch: &Batch) -> DomainResult<()> {
        let batch = batch.clone();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO sync_batches (batch_id, customer_key, batch_type, status, total_records,
                                           successful_records, failed_records, start_time, end_time,
                                           error_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    batch.batch_id,
                    batch.customer_key,
                    batch.batch_type,
                    batch.status.as_str(),
                    batch.total_records,
                    batch.successful_records,
                    batch.failed_records,
                    to_millis(batch.start_time),
                    batch.end_time.map(to_millis),
                    batch.error_summary,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, lease))]
    async fn claim(&self, batch_id: &str, owner: &str, lease: Duration) -> DomainResult<bool> {
        let batch_id = batch_id.to_string();
        let owner = owner.to_string();
        let now = to_millis(Utc::now());
        let expires_at = now.saturating_add(i64::try_from(lease.as_millis()).unwrap_or(i64::MAX));
        with_connection(&self.db, move |conn| {
            // One statement, so two runs racing for the batch cannot both win.
            let changed = conn
                .execute(
                    "UPDATE sync_batches
                     SET status = 'PROCESSING', worker_id = ?2, lease_expires_at = ?4
                     WHERE batch_id = ?1
                       AND status IN ('STARTED', 'PROCESSING')
                       AND (worker_id IS NULL
                            OR worker_id = ?2
                            OR lease_expires_at IS NULL
                            OR lease_expires_at <= ?3)",
                    params![batch_id, owner, now, expires_at],
                )
                .map_err(map_sql_error)?;
            debug!(batch_id = %batch_id, owner = %owner, claimed = changed > 0, "batch claim");
            Ok(changed > 0)
        })
        .await
    }

    async fn release(&self, batch_id: &str, owner: &str) -> DomainResult<()> {
        let batch_id = batch_id.to_string();
        let owner = owner.to_string();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "UPDATE sync_batches SET worker_id = NULL, lease_expires_at = NULL
                 WHERE batch_id = ?1 AND worker_id = ?2",
                params![batch_id, owner],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn finalize(
        &self,
        batch_id: &str,
        status: BatchStatus,
        error_summary: Option<&str>,
    ) -> DomainResult<()> {
        let batch_id = batch_id.to_string();
        let error_summary = error_summary.map(str::to_string);
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE sync_batches
                     SET status = ?2,
                         failed_records = total_records - successful_records,
                         end_time = ?3,
                         error_summary = COALESCE(?4, error_summary),
                         worker_id = NULL,
                         lease_expires_at = NULL
                     WHERE batch_id = ?1",
                    params![batch_id, status.as_str(), to_millis(Utc::now()), error_summary],
                )
                .map_err(map_sql_error)?;
            ensure_found(changed, &batch_id)
        })
        .await
    }

    // ========================================================================
    // Counters
    // ========================================================================

    async fn set_total(&self, batch_id: &str, total: u32) -> DomainResult<()> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE sync_batches
                     SET total_records = MAX(?2, successful_records + failed_records)
                     WHERE batch_id = ?1",
                    params![batch_id, total],
                )
                .map_err(map_sql_error)?;
            ensure_found(changed, &batch_id)
        })
        .await
    }

    async fn increment_counters(
        &self,
        batch_id: &str,
        successes: u32,
        failures: u32,
    ) -> DomainResult<()> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            // SET expressions all read the pre-update row.
            let changed = conn
                .execute(
                    "UPDATE sync_batches
                     SET successful_records = successful_records
                            + MIN(?2, total_records - successful_records - failed_records),
                         failed_records = failed_records
                            + MIN(?3, total_records - successful_records - failed_records
                                      - MIN(?2, total_records - successful_records - failed_records))
                     WHERE batch_id = ?1",
                    params![batch_id, successes, failures],
                )
                .map_err(map_sql_error)?;
            debug!(batch_id = %batch_id, successes, failures, "batch counters incremented");
            ensure_found(changed, &batch_id)
        })
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    async fn get(&self, batch_id: &str) -> DomainResult<Option<Batch>> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            let sql = format!("SELECT {BATCH_COLUMNS} FROM sync_batches WHERE batch_id = ?1");
            conn.query_row(&sql, params![batch_id], map_batch_row).optional().map_err(map_sql_error)
        })
        .await
    }

    async fn list_open(&self, customer_key: Option<&str>) -> DomainResult<Vec<Batch>> {
        let customer_key = customer_key.map(str::to_string);
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT {BATCH_COLUMNS} FROM sync_batches
                 WHERE status IN ('STARTED', 'PROCESSING')
                   AND (?1 IS NULL OR customer_key = ?1)
                 ORDER BY start_time ASC, batch_id ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt.query_map(params![customer_key], map_batch_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn list_recent(
        &self,
        customer_key: Option<&str>,
        limit: usize,
    ) -> DomainResult<Vec<Batch>> {
        let customer_key = customer_key.map(str::to_string);
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT {BATCH_COLUMNS} FROM sync_batches
                 WHERE (?1 IS NULL OR customer_key = ?1)
                 ORDER BY start_time DESC, batch_id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![customer_key, usize_to_i64(limit)], map_batch_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn ensure_found(changed: usize, batch_id: &str) -> DomainResult<()> {
    if changed == 0 {
        return Err(StageSyncError::NotFound(format!("batch {batch_id}")));
    }
    Ok(())
}

fn map_batch_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    let status: String = row.get(3)?;
    let end_time: Option<i64> = row.get(8)?;

    Ok(Batch {
        batch_id: row.get(0)?,
        customer_key: row.get(1)?,
        batch_type: row.get(2)?,
        status: parse_column(3, &status)?,
        total_records: to_u32(row.get(4)?),
        successful_records: to_u32(row.get(5)?),
        failed_records: to_u32(row.get(6)?),
        start_time: from_millis(7, row.get(7)?)?,
        end_time: end_time.map(|millis| from_millis(8, millis)).transpose()?,
        error_summary: row.get(9)?,
    })
}
