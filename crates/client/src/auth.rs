//! Bounded wait for cloud authentication readiness.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::GenerationBackend;

/// Delay between readiness checks.
const AUTH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait up to `wait` for `backend` to report authenticated.
///
/// Returns `false` when the budget runs out or `cancel` fires first.
pub async fn wait_for_cloud_auth(
    backend: &dyn GenerationBackend,
    wait: Duration,
    cancel: &CancellationToken,
) -> bool {
    let deadline = tokio::time::Instant::now() + wait;

    loop {
        if backend.is_authenticated().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(wait_ms = wait.as_millis() as u64, "Cloud authentication not ready");
            return false;
        }

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(AUTH_POLL_INTERVAL) => {}
        }
    }
}
