//! Settings validation and pricing, single-flight per asset.

use assetgen_client::ClientError;
use assetgen_core::request::{
    build_variation_requests, parse_model_id, resolve_seeds, GenerationSettings,
};
use assetgen_core::types::AssetKey;
use assetgen_core::validation::{AiResultError, ValidationResult};
use assetgen_events::GenerationEvent;
use tokio_util::sync::CancellationToken;

use crate::asset::check_reference;
use crate::orchestrator::{Orchestrator, INVALID_CLOUD_PROJECT_MESSAGE};
use crate::single_flight::QuoteScope;

impl Orchestrator {
    /// Validate `settings` for `asset` and ask the service what the batch
    /// would cost.
    ///
    /// A newer quote for the same asset supersedes this one: the call then
    /// returns `None` without publishing a result of its own. Validation
    /// failures are `Some` results with `success == false`.
    pub async fn quote(
        &self,
        asset: &AssetKey,
        settings: &GenerationSettings,
    ) -> Option<ValidationResult> {
        let scope = self.quotes.start_or_replace(asset);
        self.bus.publish(GenerationEvent::QuoteValidating {
            asset: asset.clone(),
        });

        match self.validate_and_price(asset, settings, scope.token()).await {
            Some(result) => self.finish_quote(&scope, result),
            None => {
                self.abandon_quote(&scope);
                None
            }
        }
    }

    /// `None` once `cancel` fires.
    async fn validate_and_price(
        &self,
        asset: &AssetKey,
        settings: &GenerationSettings,
        cancel: &CancellationToken,
    ) -> Option<ValidationResult> {
        let ready = self.cloud_auth_ready(cancel).await;
        if cancel.is_cancelled() {
            return None;
        }
        if !ready {
            return Some(ValidationResult::failed_with(
                AiResultError::InvalidCloudProject,
                INVALID_CLOUD_PROJECT_MESSAGE,
            ));
        }

        if !self.assets.exists(asset).await {
            return Some(ValidationResult::failed_with(
                AiResultError::AssetNotFound,
                format!("Asset {asset} no longer exists"),
            ));
        }

        if parse_model_id(&settings.model_id).is_none() {
            return Some(ValidationResult::failed_with(
                AiResultError::UnknownModel,
                "Select a model before generating",
            ));
        }

        if settings.refinement_mode.requires_reference() {
            let Some(reference) = settings.reference_video.as_deref() else {
                return Some(ValidationResult::failed_with(
                    AiResultError::InvalidReference,
                    "This mode needs a reference video",
                ));
            };
            if let Err(e) = check_reference(reference).await {
                return Some(ValidationResult::failed_with(
                    AiResultError::InvalidReference,
                    e.to_string(),
                ));
            }
        }
        if cancel.is_cancelled() {
            return None;
        }

        if let Err(e) = settings.validate_fields() {
            return Some(ValidationResult::failed_with(AiResultError::Unknown, e.to_string()));
        }

        let seeds = resolve_seeds(settings.custom_seed, settings.variation_count);
        let requests = build_variation_requests(settings, &seeds, None);
        let response = self
            .backend
            .quote(
                &requests,
                &settings.model_id,
                self.config.timeouts.realtime,
                cancel,
            )
            .await;

        match response {
            Ok(quote) => Some(ValidationResult::ok(quote.points_cost)),
            Err(ClientError::Cancelled) => None,
            Err(e) if e.is_timeout() => {
                tracing::warn!(asset = %asset, "Quote timed out");
                Some(ValidationResult::failed_with(
                    AiResultError::Unknown,
                    "The service took too long to respond",
                ))
            }
            Err(ClientError::Server { code, message, .. }) => {
                let feedback = if message.is_empty() { Vec::new() } else { vec![message] };
                Some(ValidationResult::failed(AiResultError::Server(code), feedback))
            }
            Err(e) => {
                tracing::warn!(asset = %asset, error = %e, "Quote failed");
                Some(ValidationResult::failed_with(AiResultError::Unknown, e.to_string()))
            }
        }
    }

    fn finish_quote(&self, scope: &QuoteScope, result: ValidationResult) -> Option<ValidationResult> {
        let published = self.quotes.complete(scope, || {
            self.bus.publish(GenerationEvent::QuoteCompleted {
                asset: scope.asset().clone(),
                result: result.clone(),
            });
        });
        if published {
            Some(result)
        } else {
            self.abandon_quote(scope);
            None
        }
    }

    fn abandon_quote(&self, scope: &QuoteScope) {
        tracing::debug!(asset = %scope.asset(), "Quote superseded");
        self.quotes.abandon(scope, || {
            self.bus.publish(GenerationEvent::QuoteValidating {
                asset: scope.asset().clone(),
            });
        });
    }
}
