/// Errors from the interrupted-download store.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// Reading or writing the checkpoint file failed.
    #[error("Recovery store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint file is not valid JSON for the expected layout.
    #[error("Recovery store is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    /// The checkpoint was written by a newer format version.
    #[error("Unsupported recovery store version {0}")]
    UnsupportedVersion(u32),
}
