//! Shared test helpers for `stagesync-core` integration tests.
//!
//! In-memory port implementations plus fixtures, so scenario tests can focus
//! on engine behaviour instead of wiring.

#![allow(dead_code)]

pub mod client;
pub mod stores;

use std::sync::Arc;

use stagesync_core::SyncEngine;
use stagesync_domain::{CandidateRecord, EngineConfig, FieldValue, Operation, Payload};
use tokio_util::sync::CancellationToken;

pub use client::{succeed_all, CallLog, ScriptedClient};
pub use stores::{MemoryBatches, MemoryProduction, MemoryStaging};

/// Engine configuration with real semantics and test-sized delays.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        initial_batch_size: 15,
        fallback_batch_sizes: vec![5, 1],
        max_concurrent_batches: 3,
        max_retries: 3,
        base_delay_ms: 5,
        max_delay_ms: 50,
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

/// `count` CREATE_ITEM candidates named `Order <n>`, starting at 1.
pub fn candidates(count: usize) -> Vec<CandidateRecord> {
    (1..=count)
        .map(|n| CandidateRecord {
            business_key: format!("order-{n}"),
            operation: Operation::CreateItem,
            target_id: "board-1".to_string(),
            payload: Payload::new()
                .with("name", FieldValue::Text(format!("Order {n}")))
                .with("qty", FieldValue::Number(n as f64)),
        })
        .collect()
}

/// Shared in-memory stores for one test.
pub struct Harness {
    pub staging: Arc<MemoryStaging>,
    pub batches: Arc<MemoryBatches>,
    pub production: Arc<MemoryProduction>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            staging: Arc::new(MemoryStaging::new()),
            batches: Arc::new(MemoryBatches::new()),
            production: Arc::new(MemoryProduction::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn engine(&self, client: Arc<ScriptedClient>, config: EngineConfig) -> SyncEngine {
        self.engine_with_token(client, config, self.cancel.clone())
    }

    pub fn engine_with_token(
        &self,
        client: Arc<ScriptedClient>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> SyncEngine {
        SyncEngine::new(
            self.staging.clone(),
            self.batches.clone(),
            self.production.clone(),
            client,
            config,
            cancel,
        )
    }
}
