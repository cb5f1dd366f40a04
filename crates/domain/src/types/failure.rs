//! Failure taxonomy for remote submissions.
//!
//! Every submission attempt is reduced to an [`AttemptOutcome`]; the
//! retry/fallback controller branches on that instead of on error strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::MAX_ERROR_MESSAGE_LEN;

/// Classified failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Network,
    Timeout,
    RateLimit,
    TemporaryServer,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    /// The durable store could not be written; aborts the owning batch.
    StagingStore,
}

impl FailureKind {
    /// Taxonomy code stored in `error_message` prefixes.
    pub fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::RateLimit => "RATE_LIMIT_ERROR",
            Self::TemporaryServer => "TEMPORARY_SERVER_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND_ERROR",
            Self::StagingStore => "STAGING_STORE_ERROR",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimit | Self::TemporaryServer)
    }

    /// A whole-request failure of this kind may be caused by the request
    /// being too large, so the controller shrinks the batch.
    pub fn is_size_suspicious(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::TemporaryServer)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure of one aliased sub-operation or of a whole request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum MutationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("temporary server error: {0}")]
    TemporaryServer(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl MutationError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Network | FailureKind::StagingStore => Self::Network(message),
            FailureKind::Timeout => Self::Timeout(message),
            FailureKind::RateLimit => Self::RateLimit(message),
            FailureKind::TemporaryServer => Self::TemporaryServer(message),
            FailureKind::Authentication => Self::Authentication(message),
            FailureKind::Authorization => Self::Authorization(message),
            FailureKind::Validation => Self::Validation(message),
            FailureKind::NotFound => Self::NotFound(message),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::RateLimit(_) => FailureKind::RateLimit,
            Self::TemporaryServer(_) => FailureKind::TemporaryServer,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::Authorization(_) => FailureKind::Authorization,
            Self::Validation(_) => FailureKind::Validation,
            Self::NotFound(_) => FailureKind::NotFound,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Network(m)
            | Self::Timeout(m)
            | Self::RateLimit(m)
            | Self::TemporaryServer(m)
            | Self::Authentication(m)
            | Self::Authorization(m)
            | Self::Validation(m)
            | Self::NotFound(m) => m,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn is_size_suspicious(&self) -> bool {
        self.kind().is_size_suspicious()
    }

    /// `"CODE: message"`, truncated for the `error_message` column.
    pub fn to_error_message(&self) -> String {
        truncate_reason(&format!("{}: {}", self.kind().code(), self.message()))
    }
}

/// Truncate a failure reason to the stored column width on a char boundary.
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_ERROR_MESSAGE_LEN {
        return reason.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Reduced result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Accepted; carries the remote identifier.
    Success(String),
    /// Transient failure; another attempt may succeed.
    Retryable(MutationError),
    /// Permanent failure for this record.
    Fatal(MutationError),
}

impl AttemptOutcome {
    pub fn from_result(result: Result<String, MutationError>) -> Self {
        match result {
            Ok(external_id) => Self::Success(external_id),
            Err(err) if err.is_retryable() => Self::Retryable(err),
            Err(err) => Self::Fatal(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
