//! Shared domain types for the asset generation orchestrator.
//!
//! Zero internal dependencies: identifiers, configuration, generation
//! settings, validation results and the download working state live here
//! so the client, recovery and pipeline crates can all agree on them.

pub mod config;
pub mod download;
pub mod error;
pub mod request;
pub mod types;
pub mod validation;
