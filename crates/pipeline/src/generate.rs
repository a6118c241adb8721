//! Batch submission and hand-off to the download loop.

use assetgen_client::BatchResult;
use assetgen_core::download::{DownloadState, GenerationMetadata};
use assetgen_core::request::{
    build_variation_requests, parse_model_id, resolve_seeds, GenerationSettings,
};
use assetgen_core::types::{AssetKey, JobId, TaskId};
use assetgen_events::{run_fuzzy_progress, GenerationEvent, ProgressReporter};
use assetgen_recovery::InterruptedDownloadRecord;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::orchestrator::{Orchestrator, INVALID_CLOUD_PROJECT_MESSAGE};
use crate::session::AssetSession;

/// Progress range covered by the reference upload.
const UPLOAD_PHASE: (f32, f32) = (0.05, 0.2);
/// Progress range covered by batch submission.
const SUBMIT_PHASE: (f32, f32) = (0.2, 0.5);

/// What a finished generation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub task_id: TaskId,
    /// Jobs the service accepted, in batch order.
    pub accepted: Vec<JobId>,
    /// Jobs whose artifacts were stored.
    pub downloaded: Vec<JobId>,
    /// Variations the service rejected.
    pub failed_items: usize,
    pub points_charged: u64,
}

/// Re-enables generation for an asset when dropped.
struct GenerationGuard<'a> {
    session: &'a AssetSession,
    asset: AssetKey,
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.session.end_generation(&self.asset);
    }
}

/// Accepted part of a batch.
struct Accepted {
    job_ids: Vec<JobId>,
    seeds: Vec<i32>,
    failed_items: usize,
    points_charged: u64,
}

impl Orchestrator {
    /// Generate `settings.variation_count` variations for `asset` and
    /// download whatever the service produces.
    ///
    /// Failures are published on the event bus before this returns;
    /// [`PipelineError::Handled`] means nothing further needs reporting.
    /// Placeholders for the run are always taken down and generation is
    /// re-enabled for the asset whatever the outcome.
    pub async fn generate(
        &self,
        asset: &AssetKey,
        settings: &GenerationSettings,
    ) -> Result<GenerationSummary, PipelineError> {
        if !self.session.try_begin_generation(asset) {
            return Err(PipelineError::GenerationInProgress(asset.clone()));
        }
        let _allowed = GenerationGuard {
            session: &self.session,
            asset: asset.clone(),
        };

        let task_id = uuid::Uuid::now_v7();
        self.session
            .add_placeholders(asset, task_id, settings.variation_count as usize);

        let result = self.run_generation(asset, task_id, settings).await;

        match &result {
            Ok(summary) => tracing::info!(
                asset = %asset,
                %task_id,
                downloaded = summary.downloaded.len(),
                points = summary.points_charged,
                "Generation finished",
            ),
            Err(PipelineError::Handled) => {
                tracing::debug!(asset = %asset, %task_id, "Generation ended with a reported failure")
            }
            Err(PipelineError::Cancelled) => {
                tracing::info!(asset = %asset, %task_id, "Generation cancelled")
            }
            Err(e) => tracing::error!(asset = %asset, %task_id, error = %e, "Generation failed unexpectedly"),
        }

        self.session.remove_placeholders(asset, task_id);
        self.progress.finish(task_id);
        result
    }

    async fn run_generation(
        &self,
        asset: &AssetKey,
        task_id: TaskId,
        settings: &GenerationSettings,
    ) -> Result<GenerationSummary, PipelineError> {
        let operation = CancellationToken::new();
        let _stop_operation = operation.clone().drop_guard();

        self.progress.begin(asset, task_id, "Preparing generation");

        if !self.cloud_auth_ready(&operation).await {
            self.report_failure(asset, vec![INVALID_CLOUD_PROJECT_MESSAGE.into()]);
            return Err(PipelineError::Handled);
        }

        if let Err(e) = settings.validate_fields() {
            self.report_failure(asset, vec![e.to_string()]);
            return Err(PipelineError::Handled);
        }
        if parse_model_id(&settings.model_id).is_none() {
            self.report_failure(asset, vec!["Select a model before generating".into()]);
            return Err(PipelineError::Handled);
        }

        let reference_id = self.upload_reference(asset, task_id, settings, &operation).await?;

        let seeds = resolve_seeds(settings.custom_seed, settings.variation_count);
        let requests = build_variation_requests(settings, &seeds, reference_id.as_deref());

        let ticker = operation.child_token();
        let ticker_guard = ticker.clone().drop_guard();
        let _detached = spawn_phase_ticker(
            &self.progress,
            asset,
            task_id,
            SUBMIT_PHASE,
            requests.len() as u32,
            ticker,
            "Submitting generation",
        );

        let batch = self
            .backend
            .submit_batch(
                &requests,
                &settings.model_id,
                self.config.timeouts.generate,
                &operation,
            )
            .await;
        drop(ticker_guard);

        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Batch rejected");
                self.report_failure(asset, vec![e.to_string()]);
                return Err(PipelineError::Handled);
            }
        };

        let accepted = self.collect_accepted(asset, batch);
        if accepted.job_ids.is_empty() {
            return Err(PipelineError::Handled);
        }

        self.bus.publish(GenerationEvent::PointsCharged {
            asset: asset.clone(),
            points: accepted.points_charged,
        });

        let state = DownloadState {
            job_ids: accepted.job_ids.clone(),
            custom_seeds: accepted.seeds,
            retryable: true,
            asset: asset.clone(),
            progress_task_id: task_id,
            unique_task_id: uuid::Uuid::new_v4(),
            metadata: GenerationMetadata::from_settings(settings),
            auto_apply: settings.auto_apply,
        };
        if let Err(e) = self
            .recovery
            .add(InterruptedDownloadRecord::from_state(&state))
            .await
        {
            tracing::error!(asset = %asset, error = %e, "Failed to record pending downloads");
        }

        self.progress
            .report(asset, task_id, SUBMIT_PHASE.1, "Waiting for results");
        let downloaded = self.download_with_retry(state).await?;

        Ok(GenerationSummary {
            task_id,
            accepted: accepted.job_ids,
            downloaded,
            failed_items: accepted.failed_items,
            points_charged: accepted.points_charged,
        })
    }

    /// Upload the reference video when the mode needs one.
    async fn upload_reference(
        &self,
        asset: &AssetKey,
        task_id: TaskId,
        settings: &GenerationSettings,
        operation: &CancellationToken,
    ) -> Result<Option<String>, PipelineError> {
        if !settings.refinement_mode.requires_reference() {
            return Ok(None);
        }
        let Some(source) = settings.reference_video.as_deref() else {
            self.report_failure(asset, vec!["This mode needs a reference video".into()]);
            return Err(PipelineError::Handled);
        };

        let prepared = match self.references.prepare(source).await {
            Ok(path) => path,
            Err(e) => {
                self.report_failure(asset, vec![e.to_string()]);
                return Err(PipelineError::Handled);
            }
        };

        let ticker = operation.child_token();
        let _ticker_guard = ticker.clone().drop_guard();
        let _detached = spawn_phase_ticker(
            &self.progress,
            asset,
            task_id,
            UPLOAD_PHASE,
            1,
            ticker,
            "Uploading reference",
        );

        match self
            .backend
            .upload_reference(
                &prepared,
                self.config.timeouts.reference_upload_create_url,
                operation,
            )
            .await
        {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Reference upload failed");
                self.report_failure(asset, vec![e.to_string()]);
                Err(PipelineError::Handled)
            }
        }
    }

    /// Report rejected items and keep the accepted ones.
    fn collect_accepted(&self, asset: &AssetKey, batch: BatchResult) -> Accepted {
        let points_charged = batch.points_charged();
        let mut job_ids = Vec::new();
        let mut seeds = Vec::new();
        let mut failed_items = 0;

        for item in batch.items {
            match item.result {
                Ok(job_id) => {
                    job_ids.push(job_id);
                    seeds.push(item.seed);
                }
                Err(err) => {
                    failed_items += 1;
                    tracing::warn!(asset = %asset, index = item.index, code = %err.code, "Variation rejected");
                    let mut messages =
                        vec![format!("Variation {} failed: {}", item.index + 1, err.code)];
                    messages.extend(err.messages);
                    self.bus.publish(GenerationEvent::ItemFailed {
                        asset: asset.clone(),
                        job_id: None,
                        messages,
                    });
                }
            }
        }

        if failed_items > 0 {
            self.bus.publish(GenerationEvent::BatchHadFailures {
                asset: asset.clone(),
                failed: failed_items,
            });
        }

        Accepted {
            job_ids,
            seeds,
            failed_items,
            points_charged,
        }
    }
}

fn spawn_phase_ticker(
    progress: &ProgressReporter,
    asset: &AssetKey,
    task_id: TaskId,
    (lower, upper): (f32, f32),
    units: u32,
    cancel: CancellationToken,
    message: &'static str,
) -> tokio::task::JoinHandle<()> {
    let progress = progress.clone();
    let asset = asset.clone();
    run_fuzzy_progress(lower, upper, units, cancel, move |value| {
        progress.report(&asset, task_id, value, message);
    })
}
