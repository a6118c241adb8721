//! Generation event bus and progress reporting.
//!
//! - [`EventBus`] - in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; the UI-observable store.
//! - [`GenerationEvent`] - everything the orchestrator tells observers.
//! - [`ProgressReporter`] - monotonic per-task progress on top of the bus.
//! - [`run_fuzzy_progress`] - detached ticker that animates progress while
//!   an opaque network call is outstanding.

pub mod bus;
pub mod progress;

pub use bus::{EventBus, GenerationEvent};
pub use progress::{run_fuzzy_progress, ProgressReporter};
