//! Recovery runner for interrupted downloads.
//!
//! The binary wires the HTTP backend, the filesystem asset store and the
//! recovery store into an [`Orchestrator`](assetgen_pipeline::Orchestrator)
//! and resumes whatever an earlier session left behind. The pieces here are
//! kept in a library so they can be tested without the process around them.

pub mod event_log;
pub mod logging;
