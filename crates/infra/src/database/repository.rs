//! Helpers shared by the SQLCipher-backed stores.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use stagesync_domain::{Result, StageSyncError};
use tokio::task;

use super::manager::DbManager;
use super::sqlcipher_pool::PooledConnection;

/// Run `op` on a pooled connection off the async runtime.
pub(crate) async fn with_connection<T, F>(db: &Arc<DbManager>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PooledConnection) -> Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || {
        let mut conn = db.get_connection()?;
        op(&mut conn)
    })
    .await
    .map_err(map_join_error)?
}

pub(crate) fn map_join_error(err: task::JoinError) -> StageSyncError {
    StageSyncError::Database(format!("blocking database task failed: {err}"))
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(index: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

/// Parse a text column through `FromStr`, reporting failures as conversion
/// errors on that column.
pub(crate) fn parse_column<T>(index: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

/// Counts stored as INTEGER never exceed `u32` in practice; clamp rather
/// than fail.
pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

pub(crate) fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_keeps_precision() {
        let now = DateTime::from_timestamp_millis(1_760_000_000_123).unwrap();
        assert_eq!(from_millis(0, to_millis(now)).unwrap(), now);
    }

    #[test]
    fn parse_column_reports_the_column() {
        let err = parse_column::<stagesync_domain::StagedStatus>(7, "SHIPPED").unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(7, Type::Text, _)));
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        assert_eq!(to_u32(-3), 0);
        assert_eq!(to_u32(i64::MAX), u32::MAX);
    }
}
