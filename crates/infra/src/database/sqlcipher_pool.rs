//! SQLCipher connection pool
//!
//! r2d2 pool of SQLite connections. When a key is supplied every connection
//! is keyed before use; otherwise the database is plain SQLite.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use stagesync_domain::{Result as DomainResult, StageSyncError};
use tracing::{debug, instrument, warn};

use crate::errors::InfraError;

pub type SqlCipherPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct SqlCipherPoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    /// Busy timeout for lock contention between pooled connections.
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl Default for SqlCipherPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
            enable_wal: true,
        }
    }
}

/// Build a pool and verify the first connection can read the database.
#[instrument(skip(encryption_key, config), fields(db_path = ?path, pool_size = config.max_size))]
pub fn create_sqlcipher_pool(
    path: &Path,
    encryption_key: Option<String>,
    config: SqlCipherPoolConfig,
) -> DomainResult<SqlCipherPool> {
    let pragmas = config.clone();
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        if let Some(key) = encryption_key.as_deref() {
            configure_sqlcipher(conn, key)?;
        }
        apply_connection_pragmas(conn, &pragmas)
    });

    let pool = Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|err| {
            warn!(error = %err, "failed to create connection pool");
            StageSyncError::from(InfraError::from(err))
        })?;

    let conn = pool.get().map_err(|err| StageSyncError::from(InfraError::from(err)))?;
    verify_readable(&conn)?;
    debug!("connection pool ready");

    Ok(pool)
}

/// Key the connection. Must run before any other statement.
fn configure_sqlcipher(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.pragma_update(None, "key", key)?;
    conn.pragma_update(None, "cipher_compatibility", 4)?;
    Ok(())
}

fn apply_connection_pragmas(conn: &Connection, config: &SqlCipherPoolConfig) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();
    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");
    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(config.busy_timeout)
}

/// A wrong key only surfaces on the first read.
fn verify_readable(conn: &Connection) -> DomainResult<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(|err| StageSyncError::from(InfraError::from(err)))
}
