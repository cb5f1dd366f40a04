//! SQLCipher-backed staging store.
//!
//! Every status change is guarded in SQL by the statuses it may leave from,
//! so a repeated or late call changes nothing and reports `false`/`0`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use stagesync_core::StagingStore;
use stagesync_domain::{
    NewStagedRecord, Payload, Result as DomainResult, StageSyncError, StagedRecord, StagedStatus,
    StatusCounts,
};
use tracing::{debug, instrument};

use super::manager::{map_sql_error, DbManager};
use super::repository::{from_millis, parse_column, to_millis, to_u32, with_connection};
use crate::errors::InfraError;

const STAGED_COLUMNS: &str = "id, batch_id, customer_key, business_key, operation, target_id,
    payload_json, status, external_id, error_message, retry_count, created_at, processed_at";

/// SQLCipher-backed [`StagingStore`].
pub struct SqlCipherStagingStore {
    db: Arc<DbManager>,
}

impl SqlCipherStagingStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StagingStore for SqlCipherStagingStore {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn insert(&self, records: &[NewStagedRecord]) -> DomainResult<Vec<i64>> {
        let records = records.to_vec();
        with_connection(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let now = to_millis(Utc::now());
            let mut ids = Vec::with_capacity(records.len());
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO staged_records (batch_id, customer_key, business_key, operation,
                                                     target_id, payload_json, status, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7)",
                    )
                    .map_err(map_sql_error)?;
                for record in &records {
                    let payload_json =
                        record.payload.to_json().map_err(|e| StageSyncError::from(InfraError::from(e)))?;
                    stmt.execute(params![
                        record.batch_id,
                        record.customer_key,
                        record.business_key,
                        record.operation.as_str(),
                        record.target_id,
                        payload_json,
                        now,
                    ])
                    .map_err(map_sql_error)?;
                    ids.push(tx.last_insert_rowid());
                }
            }
            tx.commit().map_err(map_sql_error)?;
            debug!(inserted = ids.len(), "staged records inserted");
            Ok(ids)
        })
        .await
    }

    async fn fetch_by_status(
        &self,
        batch_id: &str,
        status: StagedStatus,
    ) -> DomainResult<Vec<StagedRecord>> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            let sql = format!(
                "SELECT {STAGED_COLUMNS} FROM staged_records
                 WHERE batch_id = ?1 AND status = ?2
                 ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![batch_id, status.as_str()], map_staged_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn mark_in_flight(&self, ids: &[i64]) -> DomainResult<Vec<i64>> {
        let ids = ids.to_vec();
        with_connection(&self.db, move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let mut claimed = Vec::with_capacity(ids.len());
            for id in ids {
                if guarded_update(
                    &tx,
                    "UPDATE staged_records SET status = 'IN_FLIGHT'
                     WHERE id = ?1 AND status = 'PENDING'",
                    params![id],
                )? {
                    claimed.push(id);
                }
            }
            tx.commit().map_err(map_sql_error)?;
            Ok(claimed)
        })
        .await
    }

    async fn mark_success(&self, id: i64, external_id: &str) -> DomainResult<bool> {
        let external_id = external_id.to_string();
        with_connection(&self.db, move |conn| {
            guarded_update(
                conn,
                "UPDATE staged_records
                 SET status = 'API_SUCCESS', external_id = ?2, error_message = NULL, processed_at = ?3
                 WHERE id = ?1 AND status = 'IN_FLIGHT'",
                params![id, external_id, to_millis(Utc::now())],
            )
        })
        .await
    }

    async fn mark_failed(&self, id: i64, reason: &str) -> DomainResult<bool> {
        let reason = reason.to_string();
        with_connection(&self.db, move |conn| {
            guarded_update(
                conn,
                "UPDATE staged_records
                 SET status = 'API_FAILED', error_message = ?2, processed_at = ?3
                 WHERE id = ?1 AND status = 'IN_FLIGHT'",
                params![id, reason, to_millis(Utc::now())],
            )
        })
        .await
    }

    async fn record_retry(&self, id: i64, retry_count: u32, reason: &str) -> DomainResult<bool> {
        let reason = reason.to_string();
        with_connection(&self.db, move |conn| {
            guarded_update(
                conn,
                "UPDATE staged_records SET retry_count = ?2, error_message = ?3
                 WHERE id = ?1 AND status = 'IN_FLIGHT'",
                params![id, retry_count, reason],
            )
        })
        .await
    }

    async fn promote(&self, ids: &[i64]) -> DomainResult<usize> {
        let ids = ids.to_vec();
        with_connection(&self.db, move |conn| {
            update_each(
                conn,
                &ids,
                "UPDATE staged_records SET status = 'PROMOTED'
                 WHERE id = ?1 AND status = 'API_SUCCESS'",
            )
        })
        .await
    }

    async fn purge(&self, ids: &[i64]) -> DomainResult<usize> {
        let ids = ids.to_vec();
        with_connection(&self.db, move |conn| {
            update_each(
                conn,
                &ids,
                "DELETE FROM staged_records
                 WHERE id = ?1 AND status IN ('PROMOTED', 'API_FAILED')",
            )
        })
        .await
    }

    async fn requeue_in_flight(&self, batch_id: &str) -> DomainResult<usize> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "UPDATE staged_records SET status = 'PENDING'
                 WHERE batch_id = ?1 AND status = 'IN_FLIGHT'",
                params![batch_id],
            )
            .map_err(map_sql_error)
        })
        .await
    }

    async fn staged_business_keys(&self, customer_key: &str) -> DomainResult<Vec<String>> {
        let customer_key = customer_key.to_string();
        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT business_key FROM staged_records
                     WHERE customer_key = ?1 AND status != 'API_FAILED'",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![customer_key], |row| row.get::<_, String>(0))
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn count_by_status(&self, batch_id: &str) -> DomainResult<StatusCounts> {
        let batch_id = batch_id.to_string();
        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT status, COUNT(*) FROM staged_records
                     WHERE batch_id = ?1 GROUP BY status",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![batch_id], |row| {
                    let raw: String = row.get(0)?;
                    Ok((parse_column::<StagedStatus>(0, &raw)?, row.get::<_, i64>(1)?))
                })
                .map_err(map_sql_error)?;

            let mut counts = StatusCounts::default();
            for row in rows {
                let (status, count) = row.map_err(map_sql_error)?;
                counts.add(status, to_u32(count));
            }
            Ok(counts)
        })
        .await
    }
}

/// Execute a single-row guarded update; `true` when a row changed.
fn guarded_update(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> DomainResult<bool> {
    conn.execute(sql, params).map(|changed| changed > 0).map_err(map_sql_error)
}

/// Run `sql` (taking the id as `?1`) once per id in one transaction; returns
/// the number of rows changed.
fn update_each(conn: &mut Connection, ids: &[i64], sql: &str) -> DomainResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn.transaction().map_err(map_sql_error)?;
    let mut changed = 0;
    {
        let mut stmt = tx.prepare(sql).map_err(map_sql_error)?;
        for id in ids {
            changed += stmt.execute(params![id]).map_err(map_sql_error)?;
        }
    }
    tx.commit().map_err(map_sql_error)?;
    Ok(changed)
}

fn map_staged_row(row: &Row<'_>) -> rusqlite::Result<StagedRecord> {
    let operation: String = row.get(4)?;
    let payload_json: String = row.get(6)?;
    let status: String = row.get(7)?;
    let retry_count: i64 = row.get(10)?;
    let processed_at: Option<i64> = row.get(12)?;

    Ok(StagedRecord {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        customer_key: row.get(2)?,
        business_key: row.get(3)?,
        operation: parse_column(4, &operation)?,
        target_id: row.get(5)?,
        payload: Payload::from_json(&payload_json).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(err))
        })?,
        status: parse_column(7, &status)?,
        external_id: row.get(8)?,
        error_message: row.get(9)?,
        retry_count: to_u32(retry_count),
        created_at: from_millis(11, row.get(11)?)?,
        processed_at: processed_at.map(|millis| from_millis(12, millis)).transpose()?,
    })
}
