//! Mutation client that never leaves the process.

use async_trait::async_trait;
use stagesync_core::MutationClient;
use stagesync_domain::{MutationError, MutationRequest, MutationResult};
use tracing::debug;

/// Accepts every operation and answers with `dry-run-<alias>` ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunMutationClient;

#[async_trait]
impl MutationClient for DryRunMutationClient {
    async fn submit(&self, request: &MutationRequest) -> Result<MutationResult, MutationError> {
        debug!(operations = request.len(), "dry run: request not sent");
        let mut result = MutationResult::new();
        for op in &request.operations {
            result.succeed(op.alias.clone(), format!("dry-run-{}", op.alias));
        }
        Ok(result)
    }
}
