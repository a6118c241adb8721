//! The asset host boundary.
//!
//! [`AssetStore`] is where generated artifacts end up; [`ReferencePreparer`]
//! turns user media into something the service accepts as a reference.

use std::path::{Path, PathBuf};

use assetgen_core::download::GenerationMetadata;
use assetgen_core::request::RefinementMode;
use assetgen_core::types::{AssetKey, JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// Container formats the service accepts for reference video.
pub const SUPPORTED_REFERENCE_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(AssetKey),

    #[error("Reference media not found: {}", .0.display())]
    ReferenceMissing(PathBuf),

    #[error("Unsupported reference container: {}", .0.display())]
    UnsupportedReference(PathBuf),

    #[error("Asset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Artifact metadata
// ---------------------------------------------------------------------------

/// Stored next to every downloaded artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub job_id: JobId,
    /// Seed the job actually ran with.
    pub seed: Option<i32>,
    pub prompt: String,
    pub model_id: String,
    pub refinement_mode: RefinementMode,
    pub duration_secs: f64,
    pub requested_at: Timestamp,
    pub downloaded_at: Timestamp,
}

impl ArtifactMetadata {
    pub fn new(job_id: JobId, seed: Option<i32>, generation: &GenerationMetadata) -> Self {
        Self {
            job_id,
            seed,
            prompt: generation.prompt.clone(),
            model_id: generation.model_id.clone(),
            refinement_mode: generation.refinement_mode,
            duration_secs: generation.duration_secs,
            requested_at: generation.created_at,
            downloaded_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// AssetStore
// ---------------------------------------------------------------------------

/// Host-side storage for generation targets and their results.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    async fn exists(&self, asset: &AssetKey) -> bool;

    /// Whether the asset holds no content yet.
    async fn is_blank(&self, asset: &AssetKey) -> Result<bool, AssetError>;

    /// Whether any artifact was ever stored for the asset.
    async fn has_generation_history(&self, asset: &AssetKey) -> Result<bool, AssetError>;

    /// Keep a copy of the asset's current content.
    async fn backup(&self, asset: &AssetKey) -> Result<(), AssetError>;

    /// Persist a downloaded artifact and its metadata, returning where it
    /// was written.
    async fn store_artifact(
        &self,
        asset: &AssetKey,
        bytes: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<PathBuf, AssetError>;

    /// Make a stored artifact the asset's current content.
    async fn apply(&self, asset: &AssetKey, artifact: &Path) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// Reference media
// ---------------------------------------------------------------------------

/// Converts reference media to a supported container, trimmed to at most
/// [`REFERENCE_VIDEO_MAX_SECS`](assetgen_core::request::REFERENCE_VIDEO_MAX_SECS).
#[async_trait::async_trait]
pub trait ReferencePreparer: Send + Sync {
    async fn prepare(&self, source: &Path) -> Result<PathBuf, AssetError>;
}

/// Accepts media that is already in a supported container, unchanged.
pub struct PassthroughReferencePreparer;

#[async_trait::async_trait]
impl ReferencePreparer for PassthroughReferencePreparer {
    async fn prepare(&self, source: &Path) -> Result<PathBuf, AssetError> {
        check_reference(source).await?;
        Ok(source.to_path_buf())
    }
}

/// Validate that `path` exists and has a supported container extension.
pub async fn check_reference(path: &Path) -> Result<(), AssetError> {
    if tokio::fs::metadata(path).await.is_err() {
        return Err(AssetError::ReferenceMissing(path.to_path_buf()));
    }
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            SUPPORTED_REFERENCE_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        });
    if !supported {
        return Err(AssetError::UnsupportedReference(path.to_path_buf()));
    }
    Ok(())
}
