//! The persisted snapshot of one in-flight download.

use assetgen_core::download::{DownloadState, GenerationMetadata};
use assetgen_core::types::{AssetKey, JobId, TaskId, Timestamp};
use serde::{Deserialize, Serialize};

/// Jobs of one generation run that still await confirmation.
///
/// `job_ids` and `custom_seeds` are parallel, as in [`DownloadState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptedDownloadRecord {
    pub unique_task_id: TaskId,
    pub progress_task_id: TaskId,
    pub asset: AssetKey,
    pub job_ids: Vec<JobId>,
    pub custom_seeds: Vec<i32>,
    pub metadata: GenerationMetadata,
    #[serde(default)]
    pub auto_apply: bool,
    pub created_at: Timestamp,
}

impl InterruptedDownloadRecord {
    pub fn from_state(state: &DownloadState) -> Self {
        Self {
            unique_task_id: state.unique_task_id,
            progress_task_id: state.progress_task_id,
            asset: state.asset.clone(),
            job_ids: state.job_ids.clone(),
            custom_seeds: state.custom_seeds.clone(),
            metadata: state.metadata.clone(),
            auto_apply: state.auto_apply,
            created_at: chrono::Utc::now(),
        }
    }

    /// Rebuild a download state that picks up where this record left off.
    pub fn into_state(self, retryable: bool) -> DownloadState {
        DownloadState {
            job_ids: self.job_ids,
            custom_seeds: self.custom_seeds,
            retryable,
            asset: self.asset,
            progress_task_id: self.progress_task_id,
            unique_task_id: self.unique_task_id,
            metadata: self.metadata,
            auto_apply: self.auto_apply,
        }
    }

    /// Drop `done` from the record, keeping seeds aligned.
    ///
    /// Returns the number of job IDs removed.
    pub fn subtract(&mut self, done: &[JobId]) -> usize {
        let before = self.job_ids.len();
        let mut job_ids = Vec::with_capacity(before);
        let mut custom_seeds = Vec::with_capacity(before);

        for (i, job) in self.job_ids.drain(..).enumerate() {
            if done.contains(&job) {
                continue;
            }
            if let Some(seed) = self.custom_seeds.get(i) {
                custom_seeds.push(*seed);
            }
            job_ids.push(job);
        }

        self.job_ids = job_ids;
        self.custom_seeds = custom_seeds;
        before - self.job_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }
}
