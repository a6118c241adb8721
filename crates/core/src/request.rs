//! Generation settings, seed resolution and per-variation request
//! construction.

use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on variations in one batch.
pub const MAX_VARIATION_COUNT: u32 = 8;
/// Reference videos are trimmed to at most this many seconds before upload.
pub const REFERENCE_VIDEO_MAX_SECS: f64 = 10.0;
/// Frame rate generated motion is quantized to.
pub const MOTION_FRAME_RATE: f64 = 30.0;

// ---------------------------------------------------------------------------
// Refinement mode
// ---------------------------------------------------------------------------

/// How the backend should derive the motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    TextToMotion,
    VideoToMotion,
}

impl RefinementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToMotion => "text_to_motion",
            Self::VideoToMotion => "video_to_motion",
        }
    }

    /// Whether the mode needs an uploaded reference video.
    pub fn requires_reference(&self) -> bool {
        matches!(self, Self::VideoToMotion)
    }
}

// ---------------------------------------------------------------------------
// GenerationSettings
// ---------------------------------------------------------------------------

/// User-facing settings for one generation run.
///
/// Immutable once submitted: the orchestrator only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationSettings {
    #[validate(length(max = 2048))]
    pub prompt: String,
    /// Model identifier as selected by the user (UUID string).
    pub model_id: String,
    #[validate(range(min = 1, max = 8))]
    pub variation_count: u32,
    /// Explicit seed; a random one is chosen when absent.
    pub custom_seed: Option<i32>,
    pub refinement_mode: RefinementMode,
    /// Local reference video, required by [`RefinementMode::VideoToMotion`].
    pub reference_video: Option<PathBuf>,
    #[validate(range(min = 0.0, max = 60.0))]
    pub duration_secs: f64,
    /// Apply the first result to the asset without asking.
    #[serde(default)]
    pub auto_apply: bool,
}

impl GenerationSettings {
    /// Text-to-motion settings with a single variation and no seed.
    pub fn text_to_motion(prompt: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: model_id.into(),
            variation_count: 1,
            custom_seed: None,
            refinement_mode: RefinementMode::TextToMotion,
            reference_video: None,
            duration_secs: 4.0,
            auto_apply: false,
        }
    }

    /// Run the declarative field checks, flattening errors into one message.
    pub fn validate_fields(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

/// Parse a model identifier, rejecting empty and nil IDs.
pub fn parse_model_id(raw: &str) -> Option<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim())
        .ok()
        .filter(|id| !id.is_nil())
}

// ---------------------------------------------------------------------------
// Seeds and durations
// ---------------------------------------------------------------------------

/// Pick the base seed for a batch of `count` variations.
///
/// Variation `i` uses `base + i`, so the base is clamped to leave room for
/// the whole batch below `i32::MAX`. Negative explicit seeds clamp to 0.
pub fn resolve_base_seed(custom: Option<i32>, count: u32) -> i32 {
    let span = i32::try_from(count).unwrap_or(i32::MAX);
    let ceiling = i32::MAX.saturating_sub(span).max(1);
    match custom {
        Some(seed) => seed.clamp(0, ceiling),
        None => rand::rng().random_range(0..ceiling),
    }
}

/// Seeds for every variation in a batch.
pub fn resolve_seeds(custom: Option<i32>, count: u32) -> Vec<i32> {
    let base = resolve_base_seed(custom, count);
    (0..count as i32).map(|i| base + i).collect()
}

/// Round a duration to whole frames at [`MOTION_FRAME_RATE`], never below
/// one frame.
pub fn round_duration(secs: f64) -> f64 {
    let frames = (secs.max(0.0) * MOTION_FRAME_RATE).round().max(1.0);
    frames / MOTION_FRAME_RATE
}

// ---------------------------------------------------------------------------
// VariationRequest
// ---------------------------------------------------------------------------

/// One entry of a batch submission; the backend turns each accepted entry
/// into a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationRequest {
    pub prompt: String,
    pub duration_secs: f64,
    pub seed: i32,
    pub refinement_mode: RefinementMode,
    /// Server-side ID of the uploaded reference media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_asset_id: Option<String>,
}

/// Build one request per seed.
pub fn build_variation_requests(
    settings: &GenerationSettings,
    seeds: &[i32],
    reference_asset_id: Option<&str>,
) -> Vec<VariationRequest> {
    seeds
        .iter()
        .map(|&seed| VariationRequest {
            prompt: settings.prompt.clone(),
            duration_secs: round_duration(settings.duration_secs),
            seed,
            refinement_mode: settings.refinement_mode,
            reference_asset_id: reference_asset_id.map(str::to_string),
        })
        .collect()
}
