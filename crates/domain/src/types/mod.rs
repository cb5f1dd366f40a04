//! Domain types and models

pub mod batch;
pub mod failure;
pub mod mutation;
pub mod payload;
pub mod record;

pub use batch::{Batch, BatchStatus};
pub use failure::{truncate_reason, AttemptOutcome, FailureKind, MutationError};
pub use mutation::{alias_for, AliasedOperation, MutationRequest, MutationResult};
pub use payload::{format_number, FieldValue, Payload};
pub use record::{
    CandidateRecord, NewStagedRecord, Operation, StagedRecord, StagedStatus, StatusCounts,
};
