//! [`AssetStore`] over a plain directory tree.
//!
//! For an asset `Animations/Walk.anim` under `root`:
//!
//! | Path                                        | Content                    |
//! |---------------------------------------------|----------------------------|
//! | `root/Animations/Walk.anim`                 | current asset content      |
//! | `root/Animations/Walk.anim.bak`             | pre-generation backup      |
//! | `root/Animations/Walk.anim.generations/`    | generation history         |
//! | `.../Walk.anim.generations/<job>.motion`    | downloaded artifact        |
//! | `.../Walk.anim.generations/<job>.json`      | [`ArtifactMetadata`]       |

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use assetgen_core::types::AssetKey;

use crate::asset::{ArtifactMetadata, AssetError, AssetStore};

const HISTORY_SUFFIX: &str = ".generations";
const BACKUP_SUFFIX: &str = ".bak";
const ARTIFACT_EXTENSION: &str = "motion";

pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `asset`.
    pub fn asset_path(&self, asset: &AssetKey) -> PathBuf {
        self.root.join(asset.as_str())
    }

    pub fn history_dir(&self, asset: &AssetKey) -> PathBuf {
        with_suffix(&self.asset_path(asset), HISTORY_SUFFIX)
    }

    pub fn backup_path(&self, asset: &AssetKey) -> PathBuf {
        with_suffix(&self.asset_path(asset), BACKUP_SUFFIX)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `bytes` next to `target` and rename over it.
async fn write_replace(target: &Path, bytes: &[u8]) -> Result<(), AssetError> {
    let tmp = with_suffix(target, ".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, target).await?;
    Ok(())
}

#[async_trait::async_trait]
impl AssetStore for FsAssetStore {
    async fn exists(&self, asset: &AssetKey) -> bool {
        tokio::fs::metadata(self.asset_path(asset))
            .await
            .is_ok_and(|m| m.is_file())
    }

    async fn is_blank(&self, asset: &AssetKey) -> Result<bool, AssetError> {
        match tokio::fs::metadata(self.asset_path(asset)).await {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(asset.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn has_generation_history(&self, asset: &AssetKey) -> Result<bool, AssetError> {
        let mut entries = match tokio::fs::read_dir(self.history_dir(asset)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        Ok(entries.next_entry().await?.is_some())
    }

    async fn backup(&self, asset: &AssetKey) -> Result<(), AssetError> {
        let source = self.asset_path(asset);
        let target = self.backup_path(asset);
        tokio::fs::copy(&source, &target).await?;
        tracing::info!(asset = %asset, backup = %target.display(), "Asset backed up");
        Ok(())
    }

    async fn store_artifact(
        &self,
        asset: &AssetKey,
        bytes: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<PathBuf, AssetError> {
        let dir = self.history_dir(asset);
        tokio::fs::create_dir_all(&dir).await?;

        let job = metadata.job_id.as_str();
        let artifact = dir.join(format!("{job}.{ARTIFACT_EXTENSION}"));
        let sidecar = dir.join(format!("{job}.json"));

        write_replace(&artifact, &bytes).await?;
        write_replace(&sidecar, &serde_json::to_vec_pretty(metadata)?).await?;

        tracing::debug!(asset = %asset, job_id = %metadata.job_id, bytes = bytes.len(), "Artifact stored");
        Ok(artifact)
    }

    async fn apply(&self, asset: &AssetKey, artifact: &Path) -> Result<(), AssetError> {
        let bytes = tokio::fs::read(artifact).await?;
        write_replace(&self.asset_path(asset), &bytes).await?;
        tracing::info!(asset = %asset, artifact = %artifact.display(), "Artifact applied");
        Ok(())
    }
}
