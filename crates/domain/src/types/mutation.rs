//! Ephemeral network envelopes. Never persisted.

use std::collections::HashMap;

use super::failure::{AttemptOutcome, MutationError};
use super::payload::Payload;
use super::record::{Operation, StagedRecord};
use crate::constants::ALIAS_PREFIX;

/// One aliased sub-operation inside a request.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasedOperation {
    pub alias: String,
    pub record_id: i64,
    pub operation: Operation,
    pub target_id: String,
    pub payload: Payload,
}

/// Alias for the sub-operation at `position`.
pub fn alias_for(position: usize) -> String {
    format!("{ALIAS_PREFIX}{position}")
}

/// A batch of records packaged for one network call.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub operations: Vec<AliasedOperation>,
}

impl MutationRequest {
    /// Assign positional aliases (`op_0`, `op_1`, ...) in record order.
    pub fn from_records(records: &[StagedRecord]) -> Self {
        let operations = records
            .iter()
            .enumerate()
            .map(|(position, record)| AliasedOperation {
                alias: alias_for(position),
                record_id: record.id,
                operation: record.operation,
                target_id: record.target_id.clone(),
                payload: record.payload.clone(),
            })
            .collect();
        Self { operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn record_id_for(&self, alias: &str) -> Option<i64> {
        self.operations.iter().find(|op| op.alias == alias).map(|op| op.record_id)
    }
}

/// Demultiplexed per-alias outcomes of a request that reached the remote.
///
/// A request-level failure is not represented here; clients return
/// `Err(MutationError)` instead and every contained record shares it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResult {
    outcomes: HashMap<String, Result<String, MutationError>>,
}

impl MutationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self, alias: impl Into<String>, external_id: impl Into<String>) {
        self.outcomes.insert(alias.into(), Ok(external_id.into()));
    }

    pub fn fail(&mut self, alias: impl Into<String>, error: MutationError) {
        self.outcomes.insert(alias.into(), Err(error));
    }

    pub fn get(&self, alias: &str) -> Option<&Result<String, MutationError>> {
        self.outcomes.get(alias)
    }

    /// Outcome for `alias`; an alias the remote never answered counts as a
    /// transient server failure.
    pub fn outcome_for(&self, alias: &str) -> AttemptOutcome {
        match self.outcomes.get(alias) {
            Some(result) => AttemptOutcome::from_result(result.clone()),
            None => AttemptOutcome::Retryable(MutationError::TemporaryServer(format!(
                "no result returned for {alias}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::record::StagedStatus;

    fn record(id: i64) -> StagedRecord {
        StagedRecord {
            id,
            batch_id: "b".into(),
            customer_key: "acme".into(),
            business_key: format!("order-{id}"),
            operation: Operation::CreateItem,
            target_id: "board-1".into(),
            payload: Payload::new(),
            status: StagedStatus::InFlight,
            external_id: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn aliases_follow_position_not_id() {
        let request = MutationRequest::from_records(&[record(40), record(7)]);
        let aliases: Vec<_> = request.operations.iter().map(|op| op.alias.as_str()).collect();
        assert_eq!(aliases, ["op_0", "op_1"]);
        assert_eq!(request.record_id_for("op_1"), Some(7));
        assert_eq!(request.record_id_for("op_2"), None);
    }

    #[test]
    fn missing_alias_is_transient() {
        let mut result = MutationResult::new();
        result.succeed("op_0", "9001");
        assert_eq!(result.outcome_for("op_0"), AttemptOutcome::Success("9001".into()));
        assert!(matches!(
            result.outcome_for("op_1"),
            AttemptOutcome::Retryable(MutationError::TemporaryServer(_))
        ));
    }
}
