// Cancellation-aware waiting
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `true` when the full delay elapsed and `false` when cancelled.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }

    tokio::select! {
        () = cancel.cancelled() => {
            debug!(delay_ms = delay.as_millis() as u64, "wait interrupted by cancellation");
            false
        }
        () = tokio::time::sleep(delay) => true,
    }
}
