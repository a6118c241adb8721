//! Quote/validation result types.
//!
//! Validation failures are ordinary values, not errors: the quote flow
//! always hands back a [`ValidationResult`].

use serde::{Deserialize, Serialize};

/// Why a validation or quote did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum AiResultError {
    /// Anything the orchestrator cannot classify more precisely.
    Unknown,
    /// The selected model ID is missing or does not parse.
    UnknownModel,
    /// Cloud authentication never became ready.
    InvalidCloudProject,
    /// The target asset does not exist.
    AssetNotFound,
    /// The mode needs reference media and none usable was given.
    InvalidReference,
    /// The server rejected the request with its own error code.
    Server(String),
}

/// Outcome of a quote: success with a points cost, or a failure kind with
/// human-readable feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub error: Option<AiResultError>,
    pub points_cost: u64,
    pub feedback: Vec<String>,
}

impl ValidationResult {
    pub fn ok(points_cost: u64) -> Self {
        Self {
            success: true,
            error: None,
            points_cost,
            feedback: Vec::new(),
        }
    }

    pub fn failed(error: AiResultError, feedback: Vec<String>) -> Self {
        Self {
            success: false,
            error: Some(error),
            points_cost: 0,
            feedback,
        }
    }

    /// Shorthand for a failure with a single message.
    pub fn failed_with(error: AiResultError, message: impl Into<String>) -> Self {
        Self::failed(error, vec![message.into()])
    }
}
