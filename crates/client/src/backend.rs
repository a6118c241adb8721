//! The remote job client boundary.
//!
//! [`GenerationBackend`] is what the orchestrator calls. Every method takes
//! an explicit budget and a [`CancellationToken`]; implementations are
//! expected to fail fast when the token fires.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use assetgen_core::request::VariationRequest;
use assetgen_core::types::JobId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a single batch item was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub code: String,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Server verdict for one variation of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// Position of the variation in the submitted batch.
    pub index: usize,
    pub seed: i32,
    /// Points the server reports for this item. Only meaningful when the
    /// item was accepted.
    pub points_cost: u64,
    pub result: Result<JobId, ItemError>,
}

impl BatchItem {
    pub fn is_accepted(&self) -> bool {
        self.result.is_ok()
    }
}

/// A batch the server accepted as a whole; individual items may still
/// have been rejected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    /// Sum of points over accepted items only.
    pub fn points_charged(&self) -> u64 {
        self.items
            .iter()
            .filter(|item| item.is_accepted())
            .map(|item| item.points_cost)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteResponse {
    pub points_cost: u64,
}

// ---------------------------------------------------------------------------
// GenerationBackend
// ---------------------------------------------------------------------------

/// Opaque RPC surface of the generation service.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Whether credentials for the service are ready right now.
    async fn is_authenticated(&self) -> bool;

    /// Upload prepared reference media and return its server-side ID.
    async fn upload_reference(
        &self,
        path: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>;

    /// Submit one batch. `Err` means the batch as a whole was rejected.
    async fn submit_batch(
        &self,
        requests: &[VariationRequest],
        model_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, ClientError>;

    /// Wait for `job_id` to finish and return a URL its artifact can be
    /// fetched from.
    async fn resolve_download_url(
        &self,
        job_id: &JobId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError>;

    /// Ask what a batch would cost without running it.
    async fn quote(
        &self,
        requests: &[VariationRequest],
        model_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<QuoteResponse, ClientError>;

    /// Fetch a finished artifact.
    async fn fetch_artifact(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError>;
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Run `fut` under a budget and a cancellation scope.
///
/// Cancellation wins over the timeout; an elapsed budget becomes
/// [`ClientError::Timeout`].
pub async fn with_deadline<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(ClientError::Timeout(timeout)),
        },
    }
}
