//! Errors from the remote job client layer.

use std::time::Duration;

/// Server error codes that will never succeed on retry.
///
/// A job failing with one of these is dropped permanently.
pub const NON_RECOVERABLE_CODES: &[&str] = &[
    "ModelParameterValidationFailed",
    "ContentModerationRejected",
    "InsufficientPoints",
    "JobFailed",
    "JobNotFound",
    "JobExpired",
    "Forbidden",
];

/// Errors from the remote job client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The call did not finish within its budget.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// An enclosing scope was cancelled.
    #[error("Request cancelled")]
    Cancelled,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service rejected the call with an error code.
    #[error("Generation service error ({status}) {code}: {message}")]
    Server {
        /// HTTP status code, `0` when the error came inside a 2xx body.
        status: u16,
        code: String,
        message: String,
    },

    /// No usable credentials for the service.
    #[error("Not authenticated with the generation service")]
    Unauthenticated,

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Reading local media for upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client pool was shut down.
    #[error("HTTP client pool closed")]
    PoolClosed,
}

impl ClientError {
    /// Convenience constructor for server errors.
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            status: 0,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Request(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// The server's own error code, if this is a server error.
    pub fn server_code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether retrying the same job can never help.
    pub fn is_non_recoverable(&self) -> bool {
        self.server_code()
            .is_some_and(|code| NON_RECOVERABLE_CODES.contains(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_are_non_recoverable() {
        assert!(ClientError::server("JobFailed", "boom").is_non_recoverable());
        assert!(!ClientError::server("RateLimited", "slow down").is_non_recoverable());
        assert!(!ClientError::Timeout(Duration::from_secs(1)).is_non_recoverable());
    }

    #[test]
    fn timeout_detection() {
        assert!(ClientError::Timeout(Duration::from_secs(3)).is_timeout());
        assert!(!ClientError::Cancelled.is_timeout());
    }
}
