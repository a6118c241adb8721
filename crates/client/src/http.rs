//! REST client for the generation service.
//!
//! Wraps the service's HTTP API (reference upload, batch submission,
//! quoting, job polling, artifact transfer) using [`reqwest`]. Every call
//! leases a client from the [`ClientPool`] for its duration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assetgen_core::request::VariationRequest;
use assetgen_core::types::JobId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    with_deadline, BatchItem, BatchResult, GenerationBackend, ItemError, QuoteResponse,
};
use crate::error::ClientError;
use crate::poll::{poll_until_ready, PollConfig};
use crate::pool::ClientPool;

/// Budget for the session probe behind [`GenerationBackend::is_authenticated`].
const SESSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct WireError {
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    messages: Vec<String>,
}

impl WireError {
    fn into_item_error(self) -> ItemError {
        let mut messages = self.messages;
        if messages.is_empty() && !self.message.is_empty() {
            messages.push(self.message);
        }
        ItemError {
            code: self.code,
            messages,
        }
    }

    fn into_client_error(self, status: u16) -> ClientError {
        let message = if self.message.is_empty() {
            self.messages.join("; ")
        } else {
            self.message
        };
        ClientError::Server {
            status,
            code: self.code,
            message,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    model_id: &'a str,
    requests: &'a [VariationRequest],
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    success: bool,
    #[serde(default)]
    error: Option<WireError>,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    success: bool,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    points_cost: u64,
    seed: i32,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    points_cost: u64,
}

#[derive(Debug, Serialize)]
struct UploadUrlRequest<'a> {
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    asset_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Deserialize)]
struct DownloadUrlResponse {
    status: JobStatus,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<WireError>,
}

impl SubmitResponse {
    fn into_batch(self) -> Result<BatchResult, ClientError> {
        if !self.success {
            let err = self.error.unwrap_or_else(|| WireError {
                code: "BatchRejected".into(),
                ..Default::default()
            });
            return Err(err.into_client_error(0));
        }

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let result = match (item.success, item.job_id) {
                    (true, Some(job_id)) => Ok(JobId::new(job_id)),
                    (true, None) => Err(ItemError {
                        code: "MissingJobId".into(),
                        messages: vec!["Accepted item carried no job ID".into()],
                    }),
                    (false, _) => Err(item
                        .error
                        .unwrap_or_else(|| WireError {
                            code: "Unknown".into(),
                            ..Default::default()
                        })
                        .into_item_error()),
                };
                BatchItem {
                    index,
                    seed: item.seed,
                    points_cost: item.points_cost,
                    result,
                }
            })
            .collect();

        Ok(BatchResult { items })
    }
}

impl DownloadUrlResponse {
    /// `Ok(None)` while the job is still running.
    fn into_ready_url(self) -> Result<Option<String>, ClientError> {
        match self.status {
            JobStatus::Pending | JobStatus::Running => Ok(None),
            JobStatus::Succeeded => self
                .url
                .map(Some)
                .ok_or_else(|| ClientError::Malformed("succeeded job without a URL".into())),
            JobStatus::Failed => Err(self
                .error
                .unwrap_or_else(|| WireError {
                    code: "JobFailed".into(),
                    ..Default::default()
                })
                .into_client_error(0)),
        }
    }
}

// ---------------------------------------------------------------------------
// HttpGenerationClient
// ---------------------------------------------------------------------------

/// HTTP client for the generation service.
pub struct HttpGenerationClient {
    pool: Arc<ClientPool>,
    api_url: String,
    api_key: Option<String>,
    poll: PollConfig,
}

impl HttpGenerationClient {
    /// Create a client for the service at `api_url`.
    ///
    /// * `api_key` - Bearer token; `None` leaves the client unauthenticated.
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, pool: Arc<ClientPool>) -> Self {
        Self {
            pool,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            poll: PollConfig::default(),
        }
    }

    /// Override the job-status polling backoff.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ClientError> {
        match &self.api_key {
            Some(key) => Ok(req.bearer_auth(key)),
            None => Err(ClientError::Unauthenticated),
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let lease = self.pool.lease().await?;
        let response = self
            .authorize(lease.client().post(self.url(path)))?
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let lease = self.pool.lease().await?;
        let response = self
            .authorize(lease.client().get(self.url(path)))?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    ///
    /// Non-2xx bodies are parsed as the service's error envelope when
    /// possible; otherwise the raw body becomes the message.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthenticated);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(match serde_json::from_str::<WireError>(&body) {
            Ok(err) => err.into_client_error(status.as_u16()),
            Err(_) => ClientError::Server {
                status: status.as_u16(),
                code: format!("Http{}", status.as_u16()),
                message: body,
            },
        })
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn is_authenticated(&self) -> bool {
        if self.api_key.is_none() {
            return false;
        }
        let probe = async {
            let lease = self.pool.lease().await?;
            let response = self
                .authorize(lease.client().get(self.url("/v1/session")))?
                .send()
                .await?;
            Self::ensure_success(response).await.map(|_| ())
        };
        match tokio::time::timeout(SESSION_CHECK_TIMEOUT, probe).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Session probe failed");
                false
            }
            Err(_) => false,
        }
    }

    async fn upload_reference(
        &self,
        path: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        with_deadline(timeout, cancel, async {
            let bytes = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("reference");

            let target: UploadUrlResponse = self
                .post_json("/v1/assets/upload-url", &UploadUrlRequest { file_name })
                .await?;

            let lease = self.pool.lease().await?;
            let response = lease.client().put(&target.upload_url).body(bytes).send().await?;
            Self::ensure_success(response).await?;

            tracing::debug!(asset_id = %target.asset_id, file_name, "Reference uploaded");
            Ok(target.asset_id)
        })
        .await
    }

    async fn submit_batch(
        &self,
        requests: &[VariationRequest],
        model_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, ClientError> {
        with_deadline(timeout, cancel, async {
            let response: SubmitResponse = self
                .post_json("/v1/generations/animation", &GenerationBody { model_id, requests })
                .await?;
            response.into_batch()
        })
        .await
    }

    async fn resolve_download_url(
        &self,
        job_id: &JobId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ClientError> {
        let path = format!("/v1/jobs/{}/download-url", job_id);
        let path = path.as_str();
        with_deadline(
            timeout,
            cancel,
            poll_until_ready(&self.poll, cancel, move || async move {
                let response: DownloadUrlResponse = self.get_json(path).await?;
                response.into_ready_url()
            }),
        )
        .await
    }

    async fn quote(
        &self,
        requests: &[VariationRequest],
        model_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<QuoteResponse, ClientError> {
        with_deadline(timeout, cancel, async {
            let body: QuoteBody = self
                .post_json(
                    "/v1/generations/animation/quote",
                    &GenerationBody { model_id, requests },
                )
                .await?;
            Ok(QuoteResponse {
                points_cost: body.points_cost,
            })
        })
        .await
    }

    async fn fetch_artifact(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ClientError> {
        with_deadline(timeout, cancel, async {
            let lease = self.pool.lease().await?;
            let response = lease.client().get(url).send().await?;
            let response = Self::ensure_success(response).await?;
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }
}
