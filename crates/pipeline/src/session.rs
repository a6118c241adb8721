//! Per-asset UI state that lives for one process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use assetgen_core::types::{AssetKey, TaskId};
use assetgen_events::{EventBus, GenerationEvent};

#[derive(Default)]
struct SessionState {
    /// Assets with a generation currently running.
    busy: HashSet<AssetKey>,
    /// Placeholder slot counts by run.
    placeholders: HashMap<(AssetKey, TaskId), usize>,
    /// Assets whose results may replace content without asking.
    replace_without_confirmation: HashSet<AssetKey>,
}

/// Generation-allowed flags, placeholder slots and replace-without-confirmation
/// marks. Every change is published on the [`EventBus`].
pub struct AssetSession {
    bus: Arc<EventBus>,
    state: Mutex<SessionState>,
}

impl AssetSession {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- generation allowed ----

    /// Claim `asset` for a generation. Returns `false` if one is running.
    pub fn try_begin_generation(&self, asset: &AssetKey) -> bool {
        if !self.lock().busy.insert(asset.clone()) {
            return false;
        }
        self.bus.publish(GenerationEvent::GenerationAllowed {
            asset: asset.clone(),
            allowed: false,
        });
        true
    }

    pub fn end_generation(&self, asset: &AssetKey) {
        self.lock().busy.remove(asset);
        self.bus.publish(GenerationEvent::GenerationAllowed {
            asset: asset.clone(),
            allowed: true,
        });
    }

    pub fn is_generation_allowed(&self, asset: &AssetKey) -> bool {
        !self.lock().busy.contains(asset)
    }

    // ---- placeholders ----

    pub fn add_placeholders(&self, asset: &AssetKey, task_id: TaskId, count: usize) {
        self.lock()
            .placeholders
            .insert((asset.clone(), task_id), count);
        self.bus.publish(GenerationEvent::PlaceholdersAdded {
            asset: asset.clone(),
            task_id,
            count,
        });
    }

    /// Remove the placeholders of one run. Returns `false` (and publishes
    /// nothing) if they were already gone.
    pub fn remove_placeholders(&self, asset: &AssetKey, task_id: TaskId) -> bool {
        let removed = self
            .lock()
            .placeholders
            .remove(&(asset.clone(), task_id))
            .is_some();
        if removed {
            self.bus.publish(GenerationEvent::PlaceholdersRemoved {
                asset: asset.clone(),
                task_id,
            });
        }
        removed
    }

    pub fn placeholder_count(&self, asset: &AssetKey, task_id: TaskId) -> usize {
        self.lock()
            .placeholders
            .get(&(asset.clone(), task_id))
            .copied()
            .unwrap_or(0)
    }

    // ---- replace without confirmation ----

    pub fn mark_replace_without_confirmation(&self, asset: &AssetKey) {
        if self.lock().replace_without_confirmation.insert(asset.clone()) {
            self.bus.publish(GenerationEvent::ReplaceWithoutConfirmation {
                asset: asset.clone(),
            });
        }
    }

    pub fn replaces_without_confirmation(&self, asset: &AssetKey) -> bool {
        self.lock().replace_without_confirmation.contains(asset)
    }
}
