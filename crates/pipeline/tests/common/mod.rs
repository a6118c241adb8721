//! Shared fixtures for orchestration integration tests.
//!
//! [`ScriptedBackend`] answers every call from a script so tests can decide
//! per job whether its download URL is ready, times out or fails.
//! [`MemoryAssetStore`] keeps assets and artifacts in memory and records
//! what the orchestrator did to them.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetgen_client::{
    with_deadline, BatchItem, BatchResult, ClientError, GenerationBackend, ItemError,
    QuoteResponse,
};
use assetgen_core::config::OrchestratorConfig;
use assetgen_core::download::{DownloadState, GenerationMetadata};
use assetgen_core::request::{RefinementMode, VariationRequest};
use assetgen_core::types::{AssetKey, JobId};
use assetgen_events::{EventBus, GenerationEvent};
use assetgen_pipeline::{ArtifactMetadata, AssetError, AssetStore, Orchestrator};
use assetgen_recovery::{InterruptedDownloadRecord, InterruptedDownloadStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const MODEL: &str = "3f8e2a71-9c4d-4b6e-8f1a-5d2c7b9e0a13";

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// How one `resolve_download_url` call for a job behaves.
#[derive(Debug, Clone)]
pub enum UrlBehavior {
    Ready,
    /// Fail with a timeout immediately.
    Timeout,
    /// Fail with this server error code.
    ServerError(&'static str),
    /// Never answer; the caller's deadline decides.
    Hang,
}

/// Scripted verdict for one batch item.
#[derive(Debug, Clone)]
pub enum ItemScript {
    Accept { job: &'static str, points: u64 },
    Reject { code: &'static str },
}

#[derive(Default)]
pub struct ScriptedBackend {
    pub authenticated: AtomicBool,
    /// `None` accepts every request with 10 points each.
    pub batch_items: Mutex<Option<Vec<ItemScript>>>,
    /// Reject the whole batch with this code.
    pub batch_rejection: Mutex<Option<&'static str>>,
    /// Per-job behavior queue; an exhausted queue means `Ready`.
    pub url_script: Mutex<HashMap<JobId, VecDeque<UrlBehavior>>>,
    /// Every resolve call, in order, with the budget it was given.
    pub resolve_calls: Mutex<Vec<(JobId, Duration)>>,
    pub submitted: Mutex<Vec<Vec<VariationRequest>>>,
    pub uploads: Mutex<Vec<PathBuf>>,
    /// Delay applied to each successive quote call.
    pub quote_delays: Mutex<VecDeque<Duration>>,
    pub quote_points: Mutex<u64>,
    pub quote_error: Mutex<Option<&'static str>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.authenticated.store(true, Ordering::SeqCst);
        *backend.quote_points.lock().unwrap() = 40;
        backend
    }

    pub fn script_batch(&self, items: Vec<ItemScript>) {
        *self.batch_items.lock().unwrap() = Some(items);
    }

    pub fn script_job(&self, job: &str, behaviors: Vec<UrlBehavior>) {
        self.url_script
            .lock()
            .unwrap()
            .insert(JobId::from(job), behaviors.into());
    }

    /// Job IDs in the order they were resolved.
    pub fn resolved_jobs(&self) -> Vec<JobId> {
        self.resolve_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(job, _)| job.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn upload_reference(
        &self,
        path: &Path,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        Ok("reference-1".into())
    }

    async fn submit_batch(
        &self,
        requests: &[VariationRequest],
        _model_id: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<BatchResult, ClientError> {
        self.submitted.lock().unwrap().push(requests.to_vec());
        if let Some(code) = *self.batch_rejection.lock().unwrap() {
            return Err(ClientError::server(code, "batch rejected"));
        }

        let script = self.batch_items.lock().unwrap().clone();
        let items = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let verdict = script
                    .as_ref()
                    .and_then(|s| s.get(index).cloned())
                    .unwrap_or(ItemScript::Accept {
                        job: ["job-0", "job-1", "job-2", "job-3", "job-4", "job-5", "job-6", "job-7"][index],
                        points: 10,
                    });
                match verdict {
                    ItemScript::Accept { job, points } => BatchItem {
                        index,
                        seed: request.seed,
                        points_cost: points,
                        result: Ok(JobId::from(job)),
                    },
                    ItemScript::Reject { code } => BatchItem {
                        index,
                        seed: request.seed,
                        points_cost: 10,
                        result: Err(ItemError {
                            code: code.into(),
                            messages: vec!["rejected by server".into()],
                        }),
                    },
                }
            })
            .collect();
        Ok(BatchResult { items })
    }

    async fn resolve_download_url(
        &self,
        job_id: &JobId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        self.resolve_calls
            .lock()
            .unwrap()
            .push((job_id.clone(), timeout));
        let behavior = self
            .url_script
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|q| q.pop_front())
            .unwrap_or(UrlBehavior::Ready);

        match behavior {
            UrlBehavior::Ready => Ok(format!("https://cdn.test/{job_id}")),
            UrlBehavior::Timeout => Err(ClientError::Timeout(timeout)),
            UrlBehavior::ServerError(code) => Err(ClientError::server(code, "job failed")),
            UrlBehavior::Hang => {
                with_deadline(timeout, cancel, std::future::pending::<Result<String, ClientError>>())
                    .await
            }
        }
    }

    async fn quote(
        &self,
        _requests: &[VariationRequest],
        _model_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<QuoteResponse, ClientError> {
        let delay = self.quote_delays.lock().unwrap().pop_front().unwrap_or_default();
        let points = *self.quote_points.lock().unwrap();
        let error = *self.quote_error.lock().unwrap();
        with_deadline(timeout.max(delay * 2), cancel, async move {
            tokio::time::sleep(delay).await;
            match error {
                Some(code) => Err(ClientError::server(code, "quote rejected")),
                None => Ok(QuoteResponse { points_cost: points }),
            }
        })
        .await
    }

    async fn fetch_artifact(
        &self,
        url: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        Ok(format!("motion:{url}").into_bytes())
    }
}

// ---------------------------------------------------------------------------
// MemoryAssetStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAssetStore {
    pub assets: Mutex<HashMap<AssetKey, Vec<u8>>>,
    pub artifacts: Mutex<Vec<(AssetKey, ArtifactMetadata)>>,
    pub backups: Mutex<Vec<AssetKey>>,
    pub applied: Mutex<Vec<(AssetKey, PathBuf)>>,
    pub fail_backup: AtomicBool,
}

impl MemoryAssetStore {
    pub fn with_asset(asset: &str, content: &[u8]) -> Self {
        let store = Self::default();
        store
            .assets
            .lock()
            .unwrap()
            .insert(AssetKey::from(asset), content.to_vec());
        store
    }

    pub fn stored_jobs(&self) -> Vec<JobId> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, meta)| meta.job_id.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryAssetStore {
    async fn exists(&self, asset: &AssetKey) -> bool {
        self.assets.lock().unwrap().contains_key(asset)
    }

    async fn is_blank(&self, asset: &AssetKey) -> Result<bool, AssetError> {
        self.assets
            .lock()
            .unwrap()
            .get(asset)
            .map(|content| content.is_empty())
            .ok_or_else(|| AssetError::NotFound(asset.clone()))
    }

    async fn has_generation_history(&self, asset: &AssetKey) -> Result<bool, AssetError> {
        Ok(self.artifacts.lock().unwrap().iter().any(|(a, _)| a == asset))
    }

    async fn backup(&self, asset: &AssetKey) -> Result<(), AssetError> {
        if self.fail_backup.load(Ordering::SeqCst) {
            return Err(AssetError::Io(std::io::Error::other("disk full")));
        }
        self.backups.lock().unwrap().push(asset.clone());
        Ok(())
    }

    async fn store_artifact(
        &self,
        asset: &AssetKey,
        _bytes: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<PathBuf, AssetError> {
        self.artifacts
            .lock()
            .unwrap()
            .push((asset.clone(), metadata.clone()));
        Ok(PathBuf::from(format!("mem/{asset}/{}", metadata.job_id)))
    }

    async fn apply(&self, asset: &AssetKey, artifact: &Path) -> Result<(), AssetError> {
        self.applied
            .lock()
            .unwrap()
            .push((asset.clone(), artifact.to_path_buf()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orch: Arc<Orchestrator>,
    pub backend: Arc<ScriptedBackend>,
    pub assets: Arc<MemoryAssetStore>,
    pub recovery: Arc<InterruptedDownloadStore>,
    pub events: broadcast::Receiver<GenerationEvent>,
    _dir: tempfile::TempDir,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_count: 2,
        ..Default::default()
    }
}

pub fn harness(assets: MemoryAssetStore, config: OrchestratorConfig) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(ScriptedBackend::new());
    let assets = Arc::new(assets);
    let recovery = Arc::new(InterruptedDownloadStore::new(
        dir.path().join("interrupted.json"),
        "test",
    ));
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let orch = Arc::new(Orchestrator::new(
        backend.clone(),
        assets.clone(),
        recovery.clone(),
        bus,
        config,
    ));
    Harness {
        orch,
        backend,
        assets,
        recovery,
        events,
        _dir: dir,
    }
}

/// Everything published so far, progress events excluded.
pub fn drain(rx: &mut broadcast::Receiver<GenerationEvent>) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(GenerationEvent::Progress { .. }) => {}
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return events,
        }
    }
}

pub fn jobs(ids: &[&str]) -> Vec<JobId> {
    ids.iter().map(|j| JobId::from(*j)).collect()
}

/// A retryable download state for `asset` covering `ids`, seeds `100 + i`.
pub fn download_state(asset: &str, ids: &[&str]) -> DownloadState {
    DownloadState {
        job_ids: jobs(ids),
        custom_seeds: (0..ids.len() as i32).map(|i| 100 + i).collect(),
        retryable: true,
        asset: AssetKey::from(asset),
        progress_task_id: uuid::Uuid::new_v4(),
        unique_task_id: uuid::Uuid::new_v4(),
        metadata: GenerationMetadata {
            prompt: "spin kick".into(),
            model_id: MODEL.into(),
            refinement_mode: RefinementMode::TextToMotion,
            duration_secs: 2.0,
            created_at: chrono::Utc::now(),
        },
        auto_apply: false,
    }
}

/// Persist `state` the way a generation would before downloading.
pub async fn record(h: &Harness, state: &DownloadState) {
    h.recovery
        .add(InterruptedDownloadRecord::from_state(state))
        .await
        .expect("record added");
}
