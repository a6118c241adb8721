//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for
//! [`GenerationEvent`]s. It is designed to be shared via `Arc<EventBus>`.

use std::path::PathBuf;

use assetgen_core::types::{AssetKey, JobId, TaskId};
use assetgen_core::validation::ValidationResult;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// GenerationEvent
// ---------------------------------------------------------------------------

/// A state change observers (UI, logs) care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// Progress for one run moved forward.
    Progress {
        asset: AssetKey,
        task_id: TaskId,
        /// Fraction in `[0, 1]`.
        progress: f32,
        message: String,
    },

    /// Skeleton entries were shown for pending variations.
    PlaceholdersAdded {
        asset: AssetKey,
        task_id: TaskId,
        count: usize,
    },

    /// Skeleton entries for a run were taken down.
    PlaceholdersRemoved { asset: AssetKey, task_id: TaskId },

    /// Whether a new generation may be started for the asset.
    GenerationAllowed { asset: AssetKey, allowed: bool },

    /// Points actually charged for the accepted part of a batch.
    PointsCharged { asset: AssetKey, points: u64 },

    /// One variation or job failed. Exactly one per failed item.
    ItemFailed {
        asset: AssetKey,
        /// `None` when the item was rejected before a job existed.
        job_id: Option<JobId>,
        messages: Vec<String>,
    },

    /// Aggregate notice that a batch had per-item failures.
    BatchHadFailures { asset: AssetKey, failed: usize },

    /// A whole operation failed for a reason not tied to one item.
    GenerationFailed {
        asset: AssetKey,
        messages: Vec<String>,
    },

    /// A finished artifact was written for the asset.
    ArtifactFulfilled {
        asset: AssetKey,
        task_id: TaskId,
        job_id: JobId,
        path: PathBuf,
        seed: Option<i32>,
    },

    /// Subsequent replacements of the asset skip the confirmation prompt.
    ReplaceWithoutConfirmation { asset: AssetKey },

    /// A quote is being computed; neutral state.
    QuoteValidating { asset: AssetKey },

    /// Final quote result for the asset.
    QuoteCompleted {
        asset: AssetKey,
        result: ValidationResult,
    },
}

impl GenerationEvent {
    /// The asset the event is about.
    pub fn asset(&self) -> &AssetKey {
        match self {
            Self::Progress { asset, .. }
            | Self::PlaceholdersAdded { asset, .. }
            | Self::PlaceholdersRemoved { asset, .. }
            | Self::GenerationAllowed { asset, .. }
            | Self::PointsCharged { asset, .. }
            | Self::ItemFailed { asset, .. }
            | Self::BatchHadFailures { asset, .. }
            | Self::GenerationFailed { asset, .. }
            | Self::ArtifactFulfilled { asset, .. }
            | Self::ReplaceWithoutConfirmation { asset }
            | Self::QuoteValidating { asset }
            | Self::QuoteCompleted { asset, .. } => asset,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`GenerationEvent`].
pub struct EventBus {
    sender: broadcast::Sender<GenerationEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: GenerationEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
