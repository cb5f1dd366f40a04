//! Staged work units and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::Payload;

/// Remote operation a staged record performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// `target_id` is the board the item is created on.
    CreateItem,
    /// `target_id` is the parent item.
    CreateSubitem,
    /// `target_id` is the item whose columns change.
    UpdateItem,
}

crate::impl_status_conversions!(Operation {
    CreateItem => "CREATE_ITEM",
    CreateSubitem => "CREATE_SUBITEM",
    UpdateItem => "UPDATE_ITEM",
});

/// Lifecycle status of a staged record.
///
/// ```text
/// PENDING -> IN_FLIGHT -> API_SUCCESS -> PROMOTED
///                    \-> API_FAILED
/// ```
///
/// `PROMOTED` and `API_FAILED` are absorbing. Retries between backoff
/// attempts keep the record `IN_FLIGHT`; `API_FAILED` is only written once
/// the outcome is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagedStatus {
    Pending,
    InFlight,
    ApiSuccess,
    ApiFailed,
    Promoted,
}

crate::impl_status_conversions!(StagedStatus {
    Pending => "PENDING",
    InFlight => "IN_FLIGHT",
    ApiSuccess => "API_SUCCESS",
    ApiFailed => "API_FAILED",
    Promoted => "PROMOTED",
});

impl StagedStatus {
    pub const ALL: [Self; 5] =
        [Self::Pending, Self::InFlight, Self::ApiSuccess, Self::ApiFailed, Self::Promoted];

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `IN_FLIGHT -> IN_FLIGHT` is allowed so a record can be resubmitted at
    /// a smaller batch size. `IN_FLIGHT -> PENDING` only happens through
    /// recovery of an interrupted run.
    pub fn can_transition_to(self, next: Self) -> bool {
        use StagedStatus::{ApiFailed, ApiSuccess, InFlight, Pending, Promoted};

        matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, InFlight | ApiSuccess | ApiFailed | Pending)
                | (ApiSuccess, Promoted)
        )
    }

    /// No further transition is possible.
    pub fn is_absorbing(self) -> bool {
        matches!(self, Self::Promoted | Self::ApiFailed)
    }

    /// The record has a final per-record outcome for this run.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::ApiSuccess | Self::ApiFailed | Self::Promoted)
    }
}

/// One unit of pending synchronization work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// Store-assigned, monotonically increasing.
    pub id: i64,
    pub batch_id: String,
    pub customer_key: String,
    /// Stable key of the authoritative record this row mirrors.
    pub business_key: String,
    pub operation: Operation,
    pub target_id: String,
    pub payload: Payload,
    pub status: StagedStatus,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Insert shape for the staging store; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStagedRecord {
    pub batch_id: String,
    pub customer_key: String,
    pub business_key: String,
    pub operation: Operation,
    pub target_id: String,
    pub payload: Payload,
}

/// Output of the change detector: an authoritative record not yet mirrored
/// downstream, already mapped to a remote payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Stable business key (e.g. an order identifier).
    pub business_key: String,
    pub operation: Operation,
    pub target_id: String,
    pub payload: Payload,
}

impl CandidateRecord {
    /// Attach the candidate to a batch.
    pub fn into_staged(self, batch_id: &str, customer_key: &str) -> NewStagedRecord {
        NewStagedRecord {
            batch_id: batch_id.to_string(),
            customer_key: customer_key.to_string(),
            business_key: self.business_key,
            operation: self.operation,
            target_id: self.target_id,
            payload: self.payload,
        }
    }
}

/// Per-status row counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u32,
    pub in_flight: u32,
    pub api_success: u32,
    pub api_failed: u32,
    pub promoted: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: StagedStatus, count: u32) {
        let slot = match status {
            StagedStatus::Pending => &mut self.pending,
            StagedStatus::InFlight => &mut self.in_flight,
            StagedStatus::ApiSuccess => &mut self.api_success,
            StagedStatus::ApiFailed => &mut self.api_failed,
            StagedStatus::Promoted => &mut self.promoted,
        };
        *slot = slot.saturating_add(count);
    }

    /// Rows without a final outcome yet.
    pub fn unresolved(&self) -> u32 {
        self.pending.saturating_add(self.in_flight)
    }

    pub fn total(&self) -> u32 {
        self.unresolved()
            .saturating_add(self.api_success)
            .saturating_add(self.api_failed)
            .saturating_add(self.promoted)
    }
}
