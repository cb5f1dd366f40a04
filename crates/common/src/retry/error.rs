// Error types for retry module
use thiserror::Error;

/// Errors raised while configuring a backoff strategy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryError {
    #[error("invalid retry configuration: {0}")]
    InvalidConfig(String),
}

impl RetryError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type for retry operations
pub type RetryResult<T> = Result<T, RetryError>;
