use assetgen_client::ClientError;
use assetgen_core::types::{AssetKey, JobId};
use assetgen_recovery::RecoveryError;

use crate::asset::AssetError;

/// Errors from the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The failure was already reported through the event bus. Callers
    /// should unwind without reporting it again.
    #[error("Generation failed (already reported)")]
    Handled,

    #[error("Operation cancelled")]
    Cancelled,

    /// The final, unbounded download attempt still left jobs pending.
    /// Always an internal logic bug; the jobs stay in the recovery store.
    #[error("Final download attempt left {} job(s) pending", .job_ids.len())]
    TerminalAttemptTimedOut { job_ids: Vec<JobId> },

    #[error("A generation is already running for {0}")]
    GenerationInProgress(AssetKey),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Unexpected pipeline failure: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Whether this error was already surfaced to the user.
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Handled | Self::Cancelled)
    }
}
