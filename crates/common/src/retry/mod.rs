// Retry module: exponential backoff with bounded jitter, plus
// cancellation-aware waiting

pub mod backoff;
pub mod constants;
pub mod error;
#[cfg(feature = "runtime")]
pub mod wait;

pub use backoff::BackoffStrategy;
pub use error::{RetryError, RetryResult};
#[cfg(feature = "runtime")]
pub use wait::sleep_or_cancel;
