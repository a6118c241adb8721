//! Generation, download and quoting orchestration.
//!
//! [`Orchestrator`] ties the remote [`GenerationBackend`], the asset host
//! ([`AssetStore`]), the recovery store and the event bus together:
//!
//! - [`Orchestrator::quote`] validates settings and prices a batch,
//!   single-flight per asset.
//! - [`Orchestrator::generate`] submits a batch and drives its downloads.
//! - [`Orchestrator::download_with_retry`] retries the still-pending jobs
//!   with a shrinking job set.
//! - [`Orchestrator::resume_interrupted_downloads`] picks up records left
//!   behind by an earlier process.
//!
//! [`GenerationBackend`]: assetgen_client::GenerationBackend

pub mod asset;
pub mod download;
pub mod error;
pub mod fs_store;
pub mod generate;
pub mod orchestrator;
pub mod quote;
pub mod resume;
pub mod retry;
pub mod session;
pub mod single_flight;

pub use asset::{
    ArtifactMetadata, AssetError, AssetStore, PassthroughReferencePreparer, ReferencePreparer,
};
pub use download::{AbortReason, DownloadOutcome};
pub use error::PipelineError;
pub use fs_store::FsAssetStore;
pub use generate::GenerationSummary;
pub use orchestrator::Orchestrator;
pub use resume::ResumeSummary;
pub use session::AssetSession;
pub use single_flight::{QuoteScope, SingleFlightRegistry};
