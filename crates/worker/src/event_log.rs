//! Mirrors [`GenerationEvent`]s into the log.
//!
//! Without a UI attached the event bus has no other consumer, so failures
//! and fulfilled artifacts would otherwise go unnoticed.

use assetgen_events::GenerationEvent;
use tokio::sync::broadcast;

/// Background task that logs every event it receives.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the bus is dropped.
    ///
    /// Returns the number of events logged.
    pub async fn run(mut receiver: broadcast::Receiver<GenerationEvent>) -> usize {
        let mut logged = 0;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::log(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, event logger shutting down");
                    return logged;
                }
            }
        }
    }

    fn log(event: &GenerationEvent) {
        match event {
            GenerationEvent::Progress {
                task_id,
                progress,
                message,
                ..
            } => {
                tracing::trace!(%task_id, progress, message = %message, "Progress");
            }
            GenerationEvent::ItemFailed {
                asset,
                job_id,
                messages,
            } => {
                tracing::warn!(
                    asset = %asset,
                    job_id = job_id.as_ref().map(|j| j.as_str()).unwrap_or("-"),
                    messages = ?messages,
                    "Item failed",
                );
            }
            GenerationEvent::GenerationFailed { asset, messages } => {
                tracing::warn!(asset = %asset, messages = ?messages, "Generation failed");
            }
            GenerationEvent::ArtifactFulfilled {
                asset,
                job_id,
                path,
                seed,
                ..
            } => {
                tracing::info!(
                    asset = %asset,
                    job_id = %job_id,
                    path = %path.display(),
                    seed = ?seed,
                    "Artifact stored",
                );
            }
            other => {
                tracing::debug!(asset = %other.asset(), event = ?other, "Event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assetgen_core::types::{AssetKey, JobId};
    use assetgen_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn logger_stops_when_bus_is_dropped() {
        let bus = EventBus::default();
        let handle = tokio::spawn(EventLogger::run(bus.subscribe()));

        bus.publish(GenerationEvent::ItemFailed {
            asset: AssetKey::from("Walk.anim"),
            job_id: Some(JobId::from("j1")),
            messages: vec!["JobFailed".into()],
        });
        bus.publish(GenerationEvent::PointsCharged {
            asset: AssetKey::from("Walk.anim"),
            points: 20,
        });
        drop(bus);

        assert_eq!(handle.await.unwrap(), 2);
    }
}
