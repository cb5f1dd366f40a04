//! Production mirror of synchronized records.
//!
//! Keyed by staged id, so copying the same staged row twice is a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use stagesync_core::ProductionStore;
use stagesync_domain::{Result as DomainResult, StageSyncError, StagedRecord};

use super::manager::{map_sql_error, DbManager};
use super::repository::{to_millis, with_connection};
use crate::errors::InfraError;

/// SQLCipher-backed [`ProductionStore`] over the `synced_records` table.
pub struct SqlCipherProductionStore {
    db: Arc<DbManager>,
}

impl SqlCipherProductionStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductionStore for SqlCipherProductionStore {
    async fn record_synced(&self, record: &StagedRecord, external_id: &str) -> DomainResult<bool> {
        let record = record.clone();
        let external_id = external_id.to_string();
        with_connection(&self.db, move |conn| {
            let payload_json =
                record.payload.to_json().map_err(|e| StageSyncError::from(InfraError::from(e)))?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO synced_records (staged_id, batch_id, customer_key,
                                                           business_key, operation, target_id,
                                                           external_id, payload_json, synced_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        record.id,
                        record.batch_id,
                        record.customer_key,
                        record.business_key,
                        record.operation.as_str(),
                        record.target_id,
                        external_id,
                        payload_json,
                        to_millis(Utc::now()),
                    ],
                )
                .map_err(map_sql_error)?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn is_synced(&self, staged_id: i64) -> DomainResult<bool> {
        with_connection(&self.db, move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM synced_records WHERE staged_id = ?1)",
                params![staged_id],
                |row| row.get::<_, bool>(0),
            )
            .map_err(map_sql_error)
        })
        .await
    }

    async fn synced_business_keys(&self, customer_key: &str) -> DomainResult<Vec<String>> {
        let customer_key = customer_key.to_string();
        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT business_key FROM synced_records
                     WHERE customer_key = ?1 ORDER BY business_key",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![customer_key], |row| row.get::<_, String>(0))
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }
}
