use std::sync::Arc;

use assetgen_client::auth::wait_for_cloud_auth;
use assetgen_client::GenerationBackend;
use assetgen_core::config::OrchestratorConfig;
use assetgen_core::types::AssetKey;
use assetgen_events::{EventBus, GenerationEvent, ProgressReporter};
use assetgen_recovery::InterruptedDownloadStore;
use tokio_util::sync::CancellationToken;

use crate::asset::{AssetStore, PassthroughReferencePreparer, ReferencePreparer};
use crate::session::AssetSession;
use crate::single_flight::SingleFlightRegistry;

/// User-facing message when cloud credentials never became ready.
pub(crate) const INVALID_CLOUD_PROJECT_MESSAGE: &str =
    "Cloud project is not valid or you are not signed in";

/// Entry point for quoting, generating and downloading.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct Orchestrator {
    pub(crate) backend: Arc<dyn GenerationBackend>,
    pub(crate) assets: Arc<dyn AssetStore>,
    pub(crate) references: Arc<dyn ReferencePreparer>,
    pub(crate) recovery: Arc<InterruptedDownloadStore>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) progress: ProgressReporter,
    pub(crate) config: OrchestratorConfig,
    pub(crate) quotes: SingleFlightRegistry,
    pub(crate) session: AssetSession,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        assets: Arc<dyn AssetStore>,
        recovery: Arc<InterruptedDownloadStore>,
        bus: Arc<EventBus>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            assets,
            references: Arc::new(PassthroughReferencePreparer),
            recovery,
            progress: ProgressReporter::new(Arc::clone(&bus)),
            session: AssetSession::new(Arc::clone(&bus)),
            bus,
            config,
            quotes: SingleFlightRegistry::new(),
        }
    }

    /// Replace the default pass-through reference preparer.
    pub fn with_reference_preparer(mut self, references: Arc<dyn ReferencePreparer>) -> Self {
        self.references = references;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn session(&self) -> &AssetSession {
        &self.session
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn recovery(&self) -> &Arc<InterruptedDownloadStore> {
        &self.recovery
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Whether a quote for `asset` is still running.
    pub fn quotes_in_flight(&self, asset: &AssetKey) -> bool {
        self.quotes.is_in_flight(asset)
    }

    // ---- shared helpers ----

    pub(crate) async fn cloud_auth_ready(&self, cancel: &CancellationToken) -> bool {
        wait_for_cloud_auth(
            self.backend.as_ref(),
            self.config.timeouts.cloud_auth_wait,
            cancel,
        )
        .await
    }

    pub(crate) fn report_failure(&self, asset: &AssetKey, messages: Vec<String>) {
        self.bus.publish(GenerationEvent::GenerationFailed {
            asset: asset.clone(),
            messages,
        });
    }
}
