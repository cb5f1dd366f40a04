//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use stagesync_domain::StageSyncError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub StageSyncError);

impl From<InfraError> for StageSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<StageSyncError> for InfraError {
    fn from(value: StageSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoStageSyncError {
    fn into_stagesync(self) -> StageSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → StageSyncError */
/* -------------------------------------------------------------------------- */

impl IntoStageSyncError for SqlError {
    fn into_stagesync(self) -> StageSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        fn looks_like_wrong_key(message: &str) -> bool {
            let lower = message.to_ascii_lowercase();
            lower.contains("not a database") || lower.contains("encrypted")
        }

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        StageSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        StageSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        StageSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        StageSyncError::Database("foreign key constraint violation".into())
                    }
                    (ErrorCode::NotADatabase, _) => StageSyncError::Database(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    (_, _) if looks_like_wrong_key(&message) => StageSyncError::Database(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => StageSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => StageSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                StageSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                StageSyncError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidPath(path) => StageSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => StageSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_stagesync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → StageSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(StageSyncError::Database(format!("connection pool: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → StageSyncError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(StageSyncError::Database(format!("payload encoding: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → StageSyncError */
/* -------------------------------------------------------------------------- */

impl IntoStageSyncError for HttpError {
    fn into_stagesync(self) -> StageSyncError {
        if self.is_timeout() {
            return StageSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return StageSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => StageSyncError::Auth(message),
                404 => StageSyncError::NotFound(message),
                400..=499 => StageSyncError::InvalidInput(message),
                _ => StageSyncError::Network(message),
            };
        }

        if self.is_builder() {
            return StageSyncError::Config(format!("invalid HTTP request: {self}"));
        }

        StageSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_stagesync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
