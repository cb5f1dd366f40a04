//! # StageSync Domain
//!
//! Data types shared by every layer of the staging-based batch
//! synchronization engine.
//!
//! This crate contains:
//! - Staged work units and their lifecycle status
//! - Operator-visible batch tracking records
//! - Ephemeral mutation request/result envelopes
//! - The failure taxonomy used for retry decisions
//! - Configuration structures and the domain error type
//!
//! ## Architecture
//! - No dependencies on other StageSync crates
//! - No I/O: pure data plus the invariants that guard it

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
