//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `STAGESYNC_DB_PATH`: Staging database file path (required)
//! - `STAGESYNC_DB_POOL_SIZE`: Connection pool size
//! - `STAGESYNC_DB_ENCRYPTION_KEY`: SQLCipher key
//! - `STAGESYNC_API_URL`: Remote GraphQL endpoint
//! - `STAGESYNC_API_TOKEN`: Remote API token (required)
//! - `STAGESYNC_BOARD_ID`: Board addressed by item updates
//!
//! Engine tuning is only read from files; the environment path uses
//! [`EngineConfig::default`].
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./stagesync.toml` or `./stagesync.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location
//!
//! A token found in the environment always overrides the file value, so
//! secrets can stay out of checked-in config files.

use std::path::{Path, PathBuf};

use stagesync_domain::{
    Config, DatabaseConfig, EngineConfig, RemoteConfig, Result, StageSyncError,
};

const FILE_STEMS: [&str; 2] = ["stagesync", "config"];
const FILE_EXTENSIONS: [&str; 2] = ["toml", "json"];
const SEARCH_DEPTH: usize = 2;

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `StageSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The resulting configuration fails validation
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `StageSyncError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("STAGESYNC_DB_PATH")?;
    let pool_size = match std::env::var("STAGESYNC_DB_POOL_SIZE") {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| StageSyncError::Config(format!("Invalid pool size: {e}")))?,
        Err(_) => DatabaseConfig::default().pool_size,
    };
    let encryption_key = env_opt("STAGESYNC_DB_ENCRYPTION_KEY");

    let api_token = env_var("STAGESYNC_API_TOKEN")?;
    let defaults = RemoteConfig::default();
    let remote = RemoteConfig {
        endpoint: env_opt("STAGESYNC_API_URL").unwrap_or(defaults.endpoint),
        api_token,
        board_id: env_opt("STAGESYNC_BOARD_ID").unwrap_or_default(),
        ..defaults
    };

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size, encryption_key },
        remote,
        engine: EngineConfig::default(),
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected
/// by file extension.
///
/// # Errors
/// Returns `StageSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(StageSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            StageSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| StageSyncError::Config(format!("Failed to read config file: {e}")))?;

    let mut config = parse_config(&contents, &config_path)?;
    apply_secret_overrides(&mut config);
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| StageSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| StageSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(StageSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

fn apply_secret_overrides(config: &mut Config) {
    if let Some(token) = env_opt("STAGESYNC_API_TOKEN") {
        config.remote.api_token = token;
    }
    if let Some(key) = env_opt("STAGESYNC_DB_ENCRYPTION_KEY") {
        config.database.encryption_key = Some(key);
    }
}

/// Candidate file names under `dir` and its ancestors, in probe order.
fn candidates_under(dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = Some(dir);
    for _ in 0..=SEARCH_DEPTH {
        let Some(base) = current else { break };
        for stem in FILE_STEMS {
            for ext in FILE_EXTENSIONS {
                paths.push(base.join(format!("{stem}.{ext}")));
            }
        }
        current = base.parent();
    }
    paths
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_under(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_under(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        StageSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Non-empty value of `key`, if set.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
