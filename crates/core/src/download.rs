//! Working state threaded through the download retry loop.

use serde::{Deserialize, Serialize};

use crate::request::{GenerationSettings, RefinementMode};
use crate::types::{AssetKey, JobId, TaskId, Timestamp};

/// What was asked for, carried alongside every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub model_id: String,
    pub refinement_mode: RefinementMode,
    pub duration_secs: f64,
    pub created_at: Timestamp,
}

impl GenerationMetadata {
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self {
            prompt: settings.prompt.clone(),
            model_id: settings.model_id.clone(),
            refinement_mode: settings.refinement_mode,
            duration_secs: settings.duration_secs,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Mutable record owned by exactly one download attempt at a time.
///
/// `job_ids` and `custom_seeds` are parallel: `custom_seeds[i]` is the seed
/// job `job_ids[i]` was generated with. Each retry narrows both to the jobs
/// that still need another pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadState {
    pub job_ids: Vec<JobId>,
    pub custom_seeds: Vec<i32>,
    /// Whether a timeout in this attempt may be retried.
    pub retryable: bool,
    pub asset: AssetKey,
    pub progress_task_id: TaskId,
    /// Key of the interrupted-download record covering these jobs.
    pub unique_task_id: TaskId,
    pub metadata: GenerationMetadata,
    /// Apply the first result that lands. Cleared once something is applied.
    pub auto_apply: bool,
}

impl DownloadState {
    /// Seed used for `job_id`, if known.
    pub fn seed_for(&self, job_id: &JobId) -> Option<i32> {
        self.job_ids
            .iter()
            .position(|j| j == job_id)
            .and_then(|i| self.custom_seeds.get(i).copied())
    }

    /// A copy narrowed to `keep`, preserving the original job order and
    /// re-deriving the matching seeds. Jobs not in `self` are ignored.
    pub fn narrowed_to(&self, keep: &[JobId]) -> Self {
        let mut job_ids = Vec::new();
        let mut custom_seeds = Vec::new();
        for (i, job) in self.job_ids.iter().enumerate() {
            if keep.contains(job) {
                job_ids.push(job.clone());
                if let Some(seed) = self.custom_seeds.get(i) {
                    custom_seeds.push(*seed);
                }
            }
        }
        Self {
            job_ids,
            custom_seeds,
            ..self.clone()
        }
    }

    /// True when every job in `self` also appears in `previous`.
    pub fn is_subset_of(&self, previous: &[JobId]) -> bool {
        self.job_ids.iter().all(|j| previous.contains(j))
    }
}
