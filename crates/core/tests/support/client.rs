//! Scripted `MutationClient` for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stagesync_core::MutationClient;
use stagesync_domain::{MutationError, MutationRequest, MutationResult};

type Handler =
    Box<dyn Fn(&MutationRequest, &CallLog) -> Result<MutationResult, MutationError> + Send + Sync>;

/// Everything the client has been asked so far.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<Vec<i64>>>,
    attempts: Mutex<HashMap<i64, usize>>,
}

impl CallLog {
    /// Record ids of every request, in submission order.
    pub fn calls(&self) -> Vec<Vec<i64>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// How many requests (of any size) have carried `record_id`, including
    /// the one being handled.
    pub fn attempts(&self, record_id: i64) -> usize {
        self.attempts.lock().unwrap().get(&record_id).copied().unwrap_or(0)
    }

    /// Single-record requests that carried `record_id`.
    pub fn individual_attempts(&self, record_id: i64) -> usize {
        self.calls.lock().unwrap().iter().filter(|ids| ids.as_slice() == [record_id]).count()
    }

    fn record(&self, request: &MutationRequest) {
        let ids: Vec<i64> = request.operations.iter().map(|op| op.record_id).collect();
        let mut attempts = self.attempts.lock().unwrap();
        for id in &ids {
            *attempts.entry(*id).or_default() += 1;
        }
        self.calls.lock().unwrap().push(ids);
    }
}

/// Client whose responses come from a closure.
pub struct ScriptedClient {
    handler: Handler,
    latency: Duration,
    log: CallLog,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(
        handler: impl Fn(&MutationRequest, &CallLog) -> Result<MutationResult, MutationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            log: CallLog::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Client that accepts everything.
    pub fn accepting() -> Self {
        Self::new(|request, _| Ok(succeed_all(request)))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Highest number of concurrently outstanding requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MutationClient for ScriptedClient {
    async fn submit(&self, request: &MutationRequest) -> Result<MutationResult, MutationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.log.record(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = (self.handler)(request, &self.log);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Every alias succeeds with `ext-<record id>`.
pub fn succeed_all(request: &MutationRequest) -> MutationResult {
    let mut result = MutationResult::new();
    for op in &request.operations {
        result.succeed(op.alias.clone(), format!("ext-{}", op.record_id));
    }
    result
}
