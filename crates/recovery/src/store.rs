//! JSON checkpoint file holding interrupted-download records.
//!
//! Layout on disk:
//!
//! ```json
//! { "version": 1, "environments": { "production": [ { ...record } ] } }
//! ```
//!
//! Records are partitioned by service environment so switching between
//! environments never resumes jobs the other one owns. Every mutation is a
//! read-modify-write under one async mutex, persisted by writing a sibling
//! temp file and renaming it over the original.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use assetgen_core::types::{AssetKey, JobId, TaskId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RecoveryError;
use crate::record::InterruptedDownloadRecord;

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    environments: BTreeMap<String, Vec<InterruptedDownloadRecord>>,
}

/// Persistent interrupted-download records for one environment.
pub struct InterruptedDownloadStore {
    path: PathBuf,
    environment: String,
    lock: Mutex<()>,
}

impl InterruptedDownloadStore {
    pub fn new(path: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            environment: environment.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Persist `record`, replacing any record with the same task ID.
    ///
    /// Job IDs in `record` are removed from every other record first so each
    /// job stays reachable through exactly one record.
    pub async fn add(&self, record: InterruptedDownloadRecord) -> Result<(), RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let records = file.environments.entry(self.environment.clone()).or_default();

        records.retain(|r| r.unique_task_id != record.unique_task_id);
        for other in records.iter_mut() {
            let moved = other.subtract(&record.job_ids);
            if moved > 0 {
                tracing::warn!(
                    task_id = %other.unique_task_id,
                    moved,
                    "Job IDs already tracked by another record, reassigning",
                );
            }
        }
        records.retain(|r| !r.is_empty());

        tracing::debug!(
            task_id = %record.unique_task_id,
            asset = %record.asset,
            jobs = record.job_ids.len(),
            "Recording interrupted download",
        );
        records.push(record);
        self.save(&mut file).await
    }

    /// Subtract `completed` from the record for `task_id`.
    ///
    /// Returns what is left of the record, or `None` once it is empty (the
    /// record is then deleted) or never existed.
    pub async fn remove(
        &self,
        task_id: TaskId,
        completed: &[JobId],
    ) -> Result<Option<InterruptedDownloadRecord>, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let Some(records) = file.environments.get_mut(&self.environment) else {
            return Ok(None);
        };
        let Some(pos) = records.iter().position(|r| r.unique_task_id == task_id) else {
            return Ok(None);
        };

        records[pos].subtract(completed);
        let remaining = if records[pos].is_empty() {
            records.remove(pos);
            None
        } else {
            Some(records[pos].clone())
        };
        if records.is_empty() {
            file.environments.remove(&self.environment);
        }

        self.save(&mut file).await?;
        Ok(remaining)
    }

    /// Turn off auto-apply on the record for `task_id` once a result has
    /// been applied.
    ///
    /// Returns `false` if the record does not exist or already had it off.
    pub async fn clear_auto_apply(&self, task_id: TaskId) -> Result<bool, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let Some(record) = file
            .environments
            .get_mut(&self.environment)
            .and_then(|records| records.iter_mut().find(|r| r.unique_task_id == task_id))
        else {
            return Ok(false);
        };
        if !record.auto_apply {
            return Ok(false);
        }

        record.auto_apply = false;
        self.save(&mut file).await?;
        Ok(true)
    }

    /// Delete the record for `task_id` regardless of its contents.
    ///
    /// Returns `false` if there was nothing to delete.
    pub async fn remove_all(&self, task_id: TaskId) -> Result<bool, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let Some(records) = file.environments.get_mut(&self.environment) else {
            return Ok(false);
        };

        let before = records.len();
        records.retain(|r| r.unique_task_id != task_id);
        if records.len() == before {
            return Ok(false);
        }
        if records.is_empty() {
            file.environments.remove(&self.environment);
        }

        self.save(&mut file).await?;
        Ok(true)
    }

    /// All records of the current environment, oldest first.
    pub async fn get_all(&self) -> Result<Vec<InterruptedDownloadRecord>, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let mut records = file.environments.remove(&self.environment).unwrap_or_default();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    pub async fn get(&self, task_id: TaskId) -> Result<Option<InterruptedDownloadRecord>, RecoveryError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .find(|r| r.unique_task_id == task_id))
    }

    pub async fn for_asset(&self, asset: &AssetKey) -> Result<Vec<InterruptedDownloadRecord>, RecoveryError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|r| &r.asset == asset)
            .collect())
    }

    // ---- private helpers ----

    async fn load(&self) -> Result<StoreFile, RecoveryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile {
                    version: FORMAT_VERSION,
                    ..Default::default()
                })
            }
            Err(e) => return Err(e.into()),
        };
        let file: StoreFile = serde_json::from_slice(&bytes)?;
        if file.version > FORMAT_VERSION {
            return Err(RecoveryError::UnsupportedVersion(file.version));
        }
        Ok(file)
    }

    async fn save(&self, file: &mut StoreFile) -> Result<(), RecoveryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        file.version = FORMAT_VERSION;
        let json = serde_json::to_vec_pretty(file)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
