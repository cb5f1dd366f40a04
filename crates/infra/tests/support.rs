//! Shared helpers for `stagesync-infra` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use stagesync_domain::{
    CandidateRecord, EngineConfig, FieldValue, NewStagedRecord, Operation, Payload,
};
use stagesync_infra::database::DbManager;
use tempfile::TempDir;

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Temporary encrypted database with migrations applied. The file lives as
/// long as the wrapper.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("staging.db");

        let manager =
            DbManager::new(&db_path, 4, Some(TEST_DB_KEY)).expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Scalar query helper for assertions against raw tables.
    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.query_row(sql, [], |row| row.get(0)).expect("count query should succeed")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn order_payload(n: usize) -> Payload {
    Payload::new()
        .with("name", FieldValue::Text(format!("Order {n}")))
        .with("qty", FieldValue::Number(n as f64))
}

/// `count` CREATE_ITEM candidates keyed `order-<n>`, starting at 1.
pub fn candidates(count: usize) -> Vec<CandidateRecord> {
    (1..=count)
        .map(|n| CandidateRecord {
            business_key: format!("order-{n}"),
            operation: Operation::CreateItem,
            target_id: "board-1".to_string(),
            payload: order_payload(n),
        })
        .collect()
}

pub fn new_records(batch_id: &str, count: usize) -> Vec<NewStagedRecord> {
    candidates(count).into_iter().map(|c| c.into_staged(batch_id, "acme")).collect()
}

/// Live-mode engine settings with millisecond delays.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        initial_batch_size: 15,
        fallback_batch_sizes: vec![5, 1],
        max_concurrent_batches: 2,
        max_retries: 2,
        base_delay_ms: 5,
        max_delay_ms: 20,
        backoff_multiplier: 2.0,
        jitter_fraction: 0.0,
        sub_batch_delay_ms: 0,
        inter_batch_delay_ms: 0,
        dry_run: false,
        retain_failed: true,
        error_summary_limit: 5,
        claim_lease_secs: 60,
    }
}
