//! Single-flight bookkeeping for per-asset quotes.
//!
//! Starting a scope for an asset cancels whichever scope was in flight for
//! it. A scope's outcome is only published while it is still the current
//! one, and the check and the publish happen under the same lock, so a
//! superseded scope can never overwrite the newer scope's result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use assetgen_core::types::AssetKey;
use tokio_util::sync::CancellationToken;

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

/// One quote's claim on an asset.
#[derive(Debug, Clone)]
pub struct QuoteScope {
    asset: AssetKey,
    generation: u64,
    cancel: CancellationToken,
}

impl QuoteScope {
    pub fn asset(&self) -> &AssetKey {
        &self.asset
    }

    /// Fires once a newer scope replaces this one.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Default)]
pub struct SingleFlightRegistry {
    in_flight: Mutex<HashMap<AssetKey, InFlight>>,
    next_generation: AtomicU64,
}

impl SingleFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetKey, InFlight>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a scope for `asset`, cancelling the one in flight.
    pub fn start_or_replace(&self, asset: &AssetKey) -> QuoteScope {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let previous = self.lock().insert(
            asset.clone(),
            InFlight {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(asset = %asset, "Superseding in-flight quote");
            previous.cancel.cancel();
        }

        QuoteScope {
            asset: asset.clone(),
            generation,
            cancel,
        }
    }

    /// Close `scope` and run `publish` if it is still the current scope.
    ///
    /// Returns `false` when a newer scope took over; `publish` is not run.
    pub fn complete(&self, scope: &QuoteScope, publish: impl FnOnce()) -> bool {
        let mut in_flight = self.lock();
        match in_flight.get(&scope.asset) {
            Some(current) if current.generation == scope.generation && !scope.is_cancelled() => {
                in_flight.remove(&scope.asset);
                publish();
                true
            }
            _ => false,
        }
    }

    /// Close a cancelled `scope`. Runs `publish` only while a newer scope is
    /// still in flight for the asset.
    pub fn abandon(&self, scope: &QuoteScope, publish: impl FnOnce()) {
        let mut in_flight = self.lock();
        match in_flight.get(&scope.asset) {
            Some(current) if current.generation == scope.generation => {
                in_flight.remove(&scope.asset);
            }
            Some(_) => publish(),
            None => {}
        }
    }

    pub fn is_in_flight(&self, asset: &AssetKey) -> bool {
        self.lock().contains_key(asset)
    }
}
