//! # StageSync Core
//!
//! Pure synchronization logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the staging store, batch tracking, the
//!   production mirror, the remote mutation client and change detection
//! - The batch builder and the retry/fallback controller
//! - Promotion/cleanup and the `SyncEngine` orchestrator
//!
//! ## Architecture Principles
//! - Only depends on `stagesync-common` and `stagesync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod sync;

pub use sync::builder::BatchBuilder;
pub use sync::engine::{BatchOutcome, BatchSnapshot, RunReport, SyncEngine};
pub use sync::fallback::{FallbackController, SliceReport};
pub use sync::ports::{
    BatchRepository, ChangeDetector, MutationClient, ProductionStore, StagingStore,
};
pub use sync::promotion::{PromotionReport, Promoter};
