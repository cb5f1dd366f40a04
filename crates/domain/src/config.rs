//! Configuration structures.
//!
//! Built once at startup and handed to each component; nothing in the engine
//! reads ambient state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StageSyncError};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(StageSyncError::Config("database.pool_size must be at least 1".into()));
        }
        self.engine.validate()
    }
}

/// Staging database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// SQLCipher key; plaintext database when absent.
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "stagesync.db".to_string(), pool_size: default_pool_size(), encryption_key: None }
    }
}

fn default_pool_size() -> u32 {
    8
}

/// Remote collaboration service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_token: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Board addressed by `UPDATE_ITEM` operations.
    #[serde(default)]
    pub board_id: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.monday.com/v2".to_string(),
            api_token: String::new(),
            api_version: None,
            timeout_ms: default_timeout_ms(),
            board_id: String::new(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Batch sizing, retry and pacing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_batch_size: usize,
    /// Smaller sizes tried after a size-suspicious failure, descending.
    pub fallback_batch_sizes: Vec<usize>,
    pub max_concurrent_batches: usize,
    /// Retries at the individual level, after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
    /// Pause between sub-slices when descending the ladder.
    pub sub_batch_delay_ms: u64,
    /// Pause between dispatch groups.
    pub inter_batch_delay_ms: u64,
    pub dry_run: bool,
    /// Keep terminal failures staged for triage instead of purging them.
    pub retain_failed: bool,
    pub error_summary_limit: usize,
    /// How long a run owns a batch before another run may take it over.
    /// Renewed before every dispatch group.
    pub claim_lease_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 15,
            fallback_batch_sizes: vec![5, 1],
            max_concurrent_batches: 3,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
            sub_batch_delay_ms: 500,
            inter_batch_delay_ms: 1_000,
            dry_run: true,
            retain_failed: true,
            error_summary_limit: 5,
            claim_lease_secs: 900,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_batch_size == 0 {
            return Err(StageSyncError::Config("initial_batch_size must be at least 1".into()));
        }
        if self.fallback_batch_sizes.contains(&0) {
            return Err(StageSyncError::Config("fallback_batch_sizes must not contain 0".into()));
        }
        let mut previous = self.initial_batch_size;
        for &size in &self.fallback_batch_sizes {
            if size >= previous {
                return Err(StageSyncError::Config(format!(
                    "fallback_batch_sizes must be strictly descending below {}, got {size}",
                    self.initial_batch_size
                )));
            }
            previous = size;
        }
        if self.max_concurrent_batches == 0 {
            return Err(StageSyncError::Config("max_concurrent_batches must be at least 1".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(StageSyncError::Config(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(StageSyncError::Config(format!(
                "jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            )));
        }
        if self.claim_lease_secs == 0 {
            return Err(StageSyncError::Config("claim_lease_secs must be at least 1".into()));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(StageSyncError::Config(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Effective fallback ladder: the initial size, then each configured
    /// smaller size, always ending at 1.
    pub fn ladder(&self) -> Vec<usize> {
        let mut ladder = vec![self.initial_batch_size.max(1)];
        for &size in &self.fallback_batch_sizes {
            if size > 0 && ladder.last().is_some_and(|&last| size < last) {
                ladder.push(size);
            }
        }
        if ladder.last() != Some(&1) {
            ladder.push(1);
        }
        ladder
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn sub_batch_delay(&self) -> Duration {
        Duration::from_millis(self.sub_batch_delay_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.engine.dry_run);
        assert_eq!(config.engine.ladder(), vec![15, 5, 1]);
    }

    #[test]
    fn ladder_always_ends_at_one() {
        let engine = EngineConfig { initial_batch_size: 10, fallback_batch_sizes: vec![4], ..Default::default() };
        assert_eq!(engine.ladder(), vec![10, 4, 1]);

        let single = EngineConfig { initial_batch_size: 1, fallback_batch_sizes: vec![], ..Default::default() };
        assert_eq!(single.ladder(), vec![1]);
    }

    #[test]
    fn rejects_non_descending_fallbacks() {
        let engine = EngineConfig { fallback_batch_sizes: vec![5, 5, 1], ..Default::default() };
        assert!(matches!(engine.validate(), Err(StageSyncError::Config(_))));

        let engine = EngineConfig { fallback_batch_sizes: vec![20], ..Default::default() };
        assert!(engine.validate().is_err());
    }

    #[test]
    fn rejects_bad_backoff_parameters() {
        let engine = EngineConfig { backoff_multiplier: 0.5, ..Default::default() };
        assert!(engine.validate().is_err());

        let engine = EngineConfig { jitter_fraction: 1.5, ..Default::default() };
        assert!(engine.validate().is_err());

        let engine = EngineConfig { base_delay_ms: 10, max_delay_ms: 5, ..Default::default() };
        assert!(engine.validate().is_err());

        let engine = EngineConfig { max_concurrent_batches: 0, ..Default::default() };
        assert!(engine.validate().is_err());

        let engine = EngineConfig { claim_lease_secs: 0, ..Default::default() };
        assert!(engine.validate().is_err());
    }

    #[test]
    fn partial_engine_section_uses_defaults() {
        let engine: EngineConfig = serde_json::from_str(r#"{"initial_batch_size": 25}"#).unwrap();
        assert_eq!(engine.initial_batch_size, 25);
        assert_eq!(engine.fallback_batch_sizes, vec![5, 1]);
        assert_eq!(engine.max_retries, 3);
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = Config::default();
        config.remote.api_token = "secret-token".into();
        config.database.encryption_key = Some("k".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("encryption_key"));
    }
}
