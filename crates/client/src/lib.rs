//! Remote job client for the AI generation service.
//!
//! Provides the [`GenerationBackend`] trait the orchestrator talks to, an
//! HTTP implementation built on [`reqwest`], a bounded client pool with
//! scoped leases, and the small timing helpers (deadlines, auth wait,
//! polling backoff) shared by every call site.

pub mod auth;
pub mod backend;
pub mod error;
pub mod http;
pub mod poll;
pub mod pool;

pub use backend::{with_deadline, BatchItem, BatchResult, GenerationBackend, ItemError, QuoteResponse};
pub use error::ClientError;
pub use http::HttpGenerationClient;
pub use pool::{ClientLease, ClientPool};
