//! Operator-visible batch tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Batch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Started,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

crate::impl_status_conversions!(BatchStatus {
    Started => "STARTED",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    CompletedWithErrors => "COMPLETED_WITH_ERRORS",
    Failed => "FAILED",
});

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors | Self::Failed)
    }

    /// Terminal status for a batch whose records all reached an outcome.
    pub fn from_counts(successful: u32, failed: u32) -> Self {
        match (successful, failed) {
            (_, 0) => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::CompletedWithErrors,
        }
    }
}

/// One operator-visible grouping of staged records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub customer_key: String,
    pub batch_type: String,
    pub status: BatchStatus,
    pub total_records: u32,
    pub successful_records: u32,
    pub failed_records: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

impl Batch {
    /// New `STARTED` batch with a time-ordered id.
    pub fn new(customer_key: impl Into<String>, batch_type: impl Into<String>) -> Self {
        Self {
            batch_id: Uuid::now_v7().to_string(),
            customer_key: customer_key.into(),
            batch_type: batch_type.into(),
            status: BatchStatus::Started,
            total_records: 0,
            successful_records: 0,
            failed_records: 0,
            start_time: Utc::now(),
            end_time: None,
            error_summary: None,
        }
    }

    pub fn resolved_records(&self) -> u32 {
        self.successful_records.saturating_add(self.failed_records)
    }

    /// `successful + failed <= total`, with equality once terminal.
    pub fn is_conserved(&self) -> bool {
        let resolved = self.resolved_records();
        if self.status.is_terminal() {
            resolved == self.total_records
        } else {
            resolved <= self.total_records
        }
    }

    pub fn unresolved_records(&self) -> u32 {
        self.total_records.saturating_sub(self.resolved_records())
    }
}
