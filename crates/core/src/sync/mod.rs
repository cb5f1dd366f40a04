//! Staging-based batch synchronization
//!
//! Records flow `ChangeDetector -> StagingStore -> BatchBuilder ->
//! FallbackController -> MutationClient`, then `Promoter` moves successes into
//! the production store and finalizes the owning batch.

pub mod builder;
pub mod engine;
pub mod fallback;
pub mod ports;
pub mod promotion;
