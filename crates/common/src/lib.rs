//! Reusable building blocks shared across StageSync crates.
//!
//! Nothing here knows about staged records or batches.
//!
//! # Feature Tiers
//!
//! - `foundation`: backoff arithmetic and its errors
//! - `runtime`: cancellation-aware waiting on a tokio runtime

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod retry;

#[cfg(feature = "foundation")]
pub use retry::{BackoffStrategy, RetryError, RetryResult};
