//! Progress reporting for orchestration runs.
//!
//! [`ProgressReporter`] publishes [`GenerationEvent::Progress`] and
//! guarantees observers never see a task's progress move backwards.
//! [`run_fuzzy_progress`] fills the gaps during opaque network calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetgen_core::types::{AssetKey, TaskId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, GenerationEvent};

/// Interval between fuzzy progress ticks.
pub const FUZZY_TICK: Duration = Duration::from_millis(250);

/// Seconds of expected wait per unit of work. A call with `total_units`
/// units covers ~63% of its range after `total_units * FUZZY_SECS_PER_UNIT`
/// seconds.
const FUZZY_SECS_PER_UNIT: f32 = 2.0;

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Publishes per-task progress, clamped to be non-decreasing.
///
/// Cheap to clone; clones share the same high-water marks.
#[derive(Clone)]
pub struct ProgressReporter {
    bus: Arc<EventBus>,
    latest: Arc<Mutex<HashMap<TaskId, f32>>>,
}

impl ProgressReporter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            latest: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a new explicit phase for `task_id` at 0%.
    ///
    /// The only way progress for a task is allowed to go back down.
    pub fn begin(&self, asset: &AssetKey, task_id: TaskId, message: impl Into<String>) {
        self.lock().insert(task_id, 0.0);
        self.publish(asset, task_id, 0.0, message.into());
    }

    /// Report `fraction` for a task and return the value actually published.
    ///
    /// Values are clamped into `[0, 1]` and never below what was previously
    /// reported for the same task.
    pub fn report(
        &self,
        asset: &AssetKey,
        task_id: TaskId,
        fraction: f32,
        message: impl Into<String>,
    ) -> f32 {
        let value = {
            let mut latest = self.lock();
            let floor = latest.get(&task_id).copied().unwrap_or(0.0);
            let value = clamp_unit(fraction).max(floor);
            latest.insert(task_id, value);
            value
        };
        self.publish(asset, task_id, value, message.into());
        value
    }

    /// Last published value for `task_id`.
    pub fn current(&self, task_id: TaskId) -> Option<f32> {
        self.lock().get(&task_id).copied()
    }

    /// Forget the high-water mark of a finished task.
    pub fn finish(&self, task_id: TaskId) {
        self.lock().remove(&task_id);
    }

    fn publish(&self, asset: &AssetKey, task_id: TaskId, progress: f32, message: String) {
        self.bus.publish(GenerationEvent::Progress {
            asset: asset.clone(),
            task_id,
            progress,
            message,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, f32>> {
        // A poisoned map only holds floats; keep using it.
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Fuzzy progress
// ---------------------------------------------------------------------------

/// Interpolated value `elapsed` into a wait of `total_units`.
///
/// Approaches `upper` asymptotically and never reaches it.
pub fn fuzzy_value(lower: f32, upper: f32, total_units: u32, elapsed: Duration) -> f32 {
    let tau = total_units.max(1) as f32 * FUZZY_SECS_PER_UNIT;
    let t = elapsed.as_secs_f32() / tau;
    let value = lower + (upper - lower) * (1.0 - (-t).exp());
    // Float rounding can land exactly on `upper` for very long waits.
    if value >= upper {
        lower.max(upper - f32::EPSILON)
    } else {
        value
    }
}

/// Spawn a detached ticker that invokes `callback` with values moving from
/// `lower` toward `upper` until `cancel` fires.
///
/// The first value (`lower`) is delivered immediately. Values are strictly
/// below `upper` and non-decreasing.
pub fn run_fuzzy_progress<F>(
    lower: f32,
    upper: f32,
    total_units: u32,
    cancel: CancellationToken,
    callback: F,
) -> JoinHandle<()>
where
    F: Fn(f32) + Send + 'static,
{
    let lower = clamp_unit(lower);
    let upper = clamp_unit(upper).max(lower);

    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(FUZZY_TICK);
        let mut last = lower;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::trace!(last, "Fuzzy progress stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let value = fuzzy_value(lower, upper, total_units, started.elapsed()).max(last);
                    last = value;
                    callback(value);
                }
            }
        }
    })
}
