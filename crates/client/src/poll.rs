//! Exponential-backoff polling for job status.
//!
//! The service exposes job completion only through polling. Call
//! [`poll_until_ready`] with a probe that returns `Ok(Some(value))` once the
//! job is done; the delay between probes grows until [`PollConfig::max_delay`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first unsuccessful probe.
    pub initial_delay: Duration,
    /// Upper bound on the delay between probes.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each probe.
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Probe until it yields a value, fails, or `cancel` fires.
///
/// No overall budget is applied here; wrap the call in
/// [`with_deadline`](crate::backend::with_deadline).
pub async fn poll_until_ready<T, F, Fut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ClientError>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if let Some(value) = probe().await? {
            tracing::debug!(attempt, "Poll target ready");
            return Ok(value);
        }

        tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "Not ready, backing off");

        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}
