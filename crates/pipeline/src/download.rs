//! One download attempt over a set of jobs.
//!
//! Download URLs are resolved one job at a time: the first job gets the
//! long budget, later jobs only a short status check, since a server that
//! has not finished the first job is unlikely to have finished the rest.
//! Artifacts that are ready are then fetched concurrently.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assetgen_client::ClientError;
use assetgen_core::download::DownloadState;
use assetgen_core::types::{AssetKey, JobId};
use assetgen_events::{run_fuzzy_progress, GenerationEvent};
use tokio_util::sync::CancellationToken;

use crate::asset::ArtifactMetadata;
use crate::error::PipelineError;
use crate::orchestrator::{Orchestrator, INVALID_CLOUD_PROJECT_MESSAGE};

/// Progress range covered while waiting on download URLs.
const RESOLVE_PHASE: (f32, f32) = (0.5, 0.8);
/// Progress range covered while artifacts land. Full completion is
/// reported separately.
const TRANSFER_PHASE: (f32, f32) = (0.8, 0.99);

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why an attempt gave up on the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Cloud authentication was not ready.
    InvalidCloudProject,
    /// No job produced an artifact and none is worth retrying.
    NothingProduced,
}

/// Result of a single download attempt.
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Nothing is left to retry.
    Complete { downloaded: Vec<JobId> },
    /// Some jobs timed out; `remaining` holds exactly those, never empty.
    PartialRetry {
        remaining: DownloadState,
        downloaded: Vec<JobId>,
    },
    /// The failure was reported; stop.
    Aborted(AbortReason),
}

enum JobResolution {
    Ready(String),
    Pending,
    Dropped,
}

struct ReadyJob {
    job_id: JobId,
    url: String,
    seed: Option<i32>,
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

impl Orchestrator {
    /// Run one download attempt for `state.job_ids`.
    ///
    /// Downloaded jobs are removed from the recovery record before
    /// returning. Every other job stays in it, so a later resume can try
    /// again.
    pub async fn download_once(
        &self,
        mut state: DownloadState,
    ) -> Result<DownloadOutcome, PipelineError> {
        let asset = state.asset.clone();
        let task_id = state.progress_task_id;
        let attempt = CancellationToken::new();
        let _stop_attempt = attempt.clone().drop_guard();

        if !self.cloud_auth_ready(&attempt).await {
            self.report_failure(&asset, vec![INVALID_CLOUD_PROJECT_MESSAGE.into()]);
            return Ok(DownloadOutcome::Aborted(AbortReason::InvalidCloudProject));
        }

        let ticker = attempt.child_token();
        {
            let progress = self.progress.clone();
            let asset = asset.clone();
            let _detached = run_fuzzy_progress(
                RESOLVE_PHASE.0,
                RESOLVE_PHASE.1,
                state.job_ids.len() as u32,
                ticker.clone(),
                move |value| {
                    progress.report(&asset, task_id, value, "Waiting for results");
                },
            );
        }

        let mut ready = Vec::new();
        let mut pending = Vec::new();
        let mut dropped = 0usize;
        let mut seen = HashSet::new();

        for (index, job_id) in state.job_ids.iter().enumerate() {
            if !seen.insert(job_id) {
                continue;
            }
            let timeout = self.url_timeout(state.retryable, index == 0);
            let resolution = self
                .resolve_job(&asset, job_id, timeout, state.retryable, &attempt.child_token())
                .await?;
            match resolution {
                JobResolution::Ready(url) => ready.push(ReadyJob {
                    job_id: job_id.clone(),
                    url,
                    seed: state.seed_for(job_id),
                }),
                JobResolution::Pending => pending.push(job_id.clone()),
                JobResolution::Dropped => dropped += 1,
            }
        }
        ticker.cancel();

        tracing::info!(
            asset = %asset,
            ready = ready.len(),
            pending = pending.len(),
            dropped,
            retryable = state.retryable,
            "Download URLs resolved",
        );

        if ready.is_empty() {
            if pending.is_empty() {
                if self.config.developer_mode {
                    self.report_failure(&asset, vec!["No job produced an artifact".into()]);
                }
                tracing::warn!(asset = %asset, "Download attempt produced nothing");
                return Ok(DownloadOutcome::Aborted(AbortReason::NothingProduced));
            }
            return Ok(DownloadOutcome::PartialRetry {
                remaining: state.narrowed_to(&pending),
                downloaded: Vec::new(),
            });
        }

        let (was_blank, apply_allowed) = self.prepare_target(&asset).await;

        let landed = AtomicUsize::new(0);
        let transfers = ready
            .iter()
            .map(|job| self.fetch_and_store(&state, job, ready.len(), &landed, &attempt));
        let results = futures::future::join_all(transfers).await;

        let mut downloaded = Vec::new();
        let mut stored = Vec::new();
        for (job, result) in ready.iter().zip(results) {
            match result {
                Ok(path) => {
                    downloaded.push(job.job_id.clone());
                    stored.push(path);
                }
                Err(e) => {
                    tracing::error!(asset = %asset, job_id = %job.job_id, error = %e, "Artifact transfer failed, job stays recorded");
                    self.report_job_failure(&asset, &job.job_id, vec![e.to_string()]);
                }
            }
        }

        if apply_allowed && (was_blank || state.auto_apply) {
            if let Some(first) = stored.first() {
                match self.assets.apply(&asset, first).await {
                    Ok(()) => {
                        if state.auto_apply {
                            state.auto_apply = false;
                            self.clear_auto_apply(&state).await;
                        }
                        if was_blank {
                            self.session.mark_replace_without_confirmation(&asset);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(asset = %asset, error = %e, "Auto-apply failed");
                    }
                }
            }
        }

        self.settle(&state, &downloaded).await;

        if pending.is_empty() {
            self.progress.report(&asset, task_id, 1.0, "Download complete");
            Ok(DownloadOutcome::Complete { downloaded })
        } else {
            Ok(DownloadOutcome::PartialRetry {
                remaining: state.narrowed_to(&pending),
                downloaded,
            })
        }
    }

    /// Budget for resolving one job's download URL.
    pub(crate) fn url_timeout(&self, retryable: bool, first_job: bool) -> Duration {
        let timeouts = &self.config.timeouts;
        if !retryable {
            timeouts.no_timeout
        } else if first_job {
            timeouts.motion_download_create_url_retry
        } else {
            timeouts.status_check_create_url_retry
        }
    }

    async fn resolve_job(
        &self,
        asset: &AssetKey,
        job_id: &JobId,
        timeout: Duration,
        retryable: bool,
        cancel: &CancellationToken,
    ) -> Result<JobResolution, PipelineError> {
        match self.backend.resolve_download_url(job_id, timeout, cancel).await {
            Ok(_) if self.config.developer_mode && self.config.simulate_server_failures => {
                tracing::warn!(job_id = %job_id, "Simulating server failure");
                self.report_job_failure(asset, job_id, vec!["Simulated server failure".into()]);
                Ok(JobResolution::Dropped)
            }
            Ok(url) => Ok(JobResolution::Ready(url)),
            Err(e) if e.is_timeout() => {
                if retryable {
                    tracing::warn!(job_id = %job_id, timeout_secs = timeout.as_secs(), "Download URL not ready, will retry");
                } else {
                    tracing::error!(job_id = %job_id, "Download URL timed out on the final attempt");
                }
                Ok(JobResolution::Pending)
            }
            Err(ClientError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) if e.is_non_recoverable() => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed permanently");
                self.report_job_failure(asset, job_id, vec![e.to_string()]);
                Ok(JobResolution::Dropped)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = ?e, "Unexpected failure resolving download URL, job stays recorded");
                self.report_job_failure(asset, job_id, vec![e.to_string()]);
                Ok(JobResolution::Dropped)
            }
        }
    }

    /// Back up the asset before its first-ever overwrite.
    ///
    /// Returns `(was_blank, apply_allowed)`. Auto-apply is withheld for
    /// this attempt when the backup could not be made.
    async fn prepare_target(&self, asset: &AssetKey) -> (bool, bool) {
        let was_blank = match self.assets.is_blank(asset).await {
            Ok(blank) => blank,
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Could not inspect asset");
                return (false, false);
            }
        };
        if was_blank {
            return (true, true);
        }

        match self.assets.has_generation_history(asset).await {
            Ok(true) => (false, true),
            Ok(false) => match self.assets.backup(asset).await {
                Ok(()) => (false, true),
                Err(e) => {
                    tracing::warn!(asset = %asset, error = %e, "Backup failed, results will not be applied automatically");
                    (false, false)
                }
            },
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Could not read generation history");
                (false, false)
            }
        }
    }

    async fn fetch_and_store(
        &self,
        state: &DownloadState,
        job: &ReadyJob,
        total: usize,
        landed: &AtomicUsize,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let bytes = self
            .backend
            .fetch_artifact(&job.url, self.config.timeouts.artifact_download, cancel)
            .await?;
        let metadata = ArtifactMetadata::new(job.job_id.clone(), job.seed, &state.metadata);
        let path = self
            .assets
            .store_artifact(&state.asset, bytes, &metadata)
            .await?;

        self.bus.publish(GenerationEvent::ArtifactFulfilled {
            asset: state.asset.clone(),
            task_id: state.progress_task_id,
            job_id: job.job_id.clone(),
            path: path.clone(),
            seed: job.seed,
        });

        let count = landed.fetch_add(1, Ordering::SeqCst) + 1;
        let (lower, upper) = TRANSFER_PHASE;
        self.progress.report(
            &state.asset,
            state.progress_task_id,
            lower + (upper - lower) * count as f32 / total.max(1) as f32,
            format!("Downloaded {count} of {total}"),
        );
        Ok(path)
    }

    /// Remove downloaded jobs from the recovery record. Failures are logged
    /// and otherwise ignored.
    async fn settle(&self, state: &DownloadState, downloaded: &[JobId]) {
        if downloaded.is_empty() {
            return;
        }
        if let Err(e) = self.recovery.remove(state.unique_task_id, downloaded).await {
            tracing::error!(
                task_id = %state.unique_task_id,
                error = %e,
                "Failed to update interrupted download record",
            );
        }
    }

    /// Persist that the first result was applied, so a resumed download
    /// does not apply another one over it.
    async fn clear_auto_apply(&self, state: &DownloadState) {
        if let Err(e) = self.recovery.clear_auto_apply(state.unique_task_id).await {
            tracing::error!(
                task_id = %state.unique_task_id,
                error = %e,
                "Failed to clear auto-apply on interrupted download record",
            );
        }
    }

    pub(crate) fn report_job_failure(&self, asset: &AssetKey, job_id: &JobId, messages: Vec<String>) {
        self.bus.publish(GenerationEvent::ItemFailed {
            asset: asset.clone(),
            job_id: Some(job_id.clone()),
            messages,
        });
    }
}
