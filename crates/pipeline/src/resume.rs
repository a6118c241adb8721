//! Resuming downloads left behind by an earlier process.

use assetgen_core::types::{JobId, TaskId};

use crate::error::PipelineError;
use crate::orchestrator::Orchestrator;

/// Totals from one [`Orchestrator::resume_interrupted_downloads`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeSummary {
    /// Records found for the current environment.
    pub found: usize,
    /// Records whose downloads ran to completion.
    pub completed: usize,
    /// Records that ended in an error.
    pub failed: usize,
    /// Records left alone because their asset is gone or busy.
    pub skipped: usize,
    pub downloaded: Vec<JobId>,
}

impl Orchestrator {
    /// Drive every interrupted-download record of the current environment
    /// through [`download_with_retry`](Self::download_with_retry).
    ///
    /// Records run one after another. A record whose asset no longer
    /// exists, or is busy with a generation, is left in the store.
    pub async fn resume_interrupted_downloads(&self) -> Result<ResumeSummary, PipelineError> {
        let records = self.recovery.get_all().await?;
        let mut summary = ResumeSummary {
            found: records.len(),
            ..Default::default()
        };

        for record in records {
            let asset = record.asset.clone();
            let task_id = record.unique_task_id;

            if !self.assets.exists(&asset).await {
                tracing::warn!(asset = %asset, %task_id, "Asset for interrupted download is missing, skipping");
                summary.skipped += 1;
                continue;
            }
            if !self.session.try_begin_generation(&asset) {
                tracing::info!(asset = %asset, %task_id, "Asset busy, leaving interrupted download for later");
                summary.skipped += 1;
                continue;
            }

            tracing::info!(asset = %asset, %task_id, jobs = record.job_ids.len(), "Resuming interrupted download");
            let progress_task = record.progress_task_id;
            self.progress.begin(&asset, progress_task, "Resuming download");

            let result = self.download_with_retry(record.into_state(true)).await;
            self.session.end_generation(&asset);
            self.progress.finish(progress_task);

            match result {
                Ok(downloaded) => {
                    summary.completed += 1;
                    summary.downloaded.extend(downloaded);
                }
                Err(e) if e.is_reported() => {
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(asset = %asset, %task_id, error = %e, "Resumed download failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            found = summary.found,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Interrupted download scan finished",
        );
        Ok(summary)
    }

    /// Forget an interrupted download without fetching it.
    ///
    /// Returns `false` if no record exists for `task_id`.
    pub async fn discard_interrupted_download(&self, task_id: TaskId) -> Result<bool, PipelineError> {
        let removed = self.recovery.remove_all(task_id).await?;
        if removed {
            tracing::info!(%task_id, "Interrupted download discarded");
        }
        Ok(removed)
    }
}
