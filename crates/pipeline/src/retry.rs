//! Bounded retry over download attempts with a shrinking job set.

use assetgen_core::download::DownloadState;
use assetgen_core::types::JobId;

use crate::download::DownloadOutcome;
use crate::error::PipelineError;
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Drive [`download_once`](Self::download_once) for at most
    /// `retry_count + 1` attempts and return every job that was downloaded.
    ///
    /// Each retry runs with exactly the jobs the previous attempt left
    /// pending. The final attempt is not retryable and resolves URLs with
    /// the unbounded budget; if it still leaves jobs pending the result is
    /// [`PipelineError::TerminalAttemptTimedOut`] and the jobs remain in the
    /// recovery store.
    pub async fn download_with_retry(
        &self,
        mut state: DownloadState,
    ) -> Result<Vec<JobId>, PipelineError> {
        let retry_count = self.config.retry_count;
        let asset = state.asset.clone();
        let task_id = state.progress_task_id;
        let mut downloaded = Vec::new();
        let mut attempt = 0;

        loop {
            state.retryable = attempt < retry_count;
            let retryable = state.retryable;
            let previous = state.job_ids.clone();

            tracing::debug!(
                asset = %asset,
                attempt = attempt + 1,
                jobs = previous.len(),
                retryable,
                "Starting download attempt",
            );

            let outcome = match self.download_once(state).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.session.remove_placeholders(&asset, task_id);
                    return Err(e);
                }
            };

            match outcome {
                DownloadOutcome::Complete { downloaded: done } => {
                    downloaded.extend(done);
                    return Ok(downloaded);
                }
                DownloadOutcome::Aborted(reason) => {
                    tracing::debug!(asset = %asset, ?reason, "Download aborted");
                    return Err(PipelineError::Handled);
                }
                DownloadOutcome::PartialRetry {
                    remaining,
                    downloaded: done,
                } => {
                    downloaded.extend(done);

                    if remaining.job_ids.is_empty()
                        || remaining.job_ids.len() > previous.len()
                        || !remaining.is_subset_of(&previous)
                    {
                        self.session.remove_placeholders(&asset, task_id);
                        return Err(PipelineError::Unexpected(format!(
                            "retry set for {asset} did not shrink: {} -> {}",
                            previous.len(),
                            remaining.job_ids.len(),
                        )));
                    }

                    if !retryable {
                        tracing::error!(
                            asset = %asset,
                            pending = remaining.job_ids.len(),
                            "Final download attempt left jobs pending",
                        );
                        self.session.remove_placeholders(&asset, task_id);
                        return Err(PipelineError::TerminalAttemptTimedOut {
                            job_ids: remaining.job_ids,
                        });
                    }

                    tracing::info!(
                        asset = %asset,
                        pending = remaining.job_ids.len(),
                        downloaded = downloaded.len(),
                        "Retrying pending downloads",
                    );
                    state = remaining;
                    attempt += 1;
                }
            }
        }
    }
}
