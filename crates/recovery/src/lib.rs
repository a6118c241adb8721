//! Persistent record of downloads that have not been confirmed yet.
//!
//! Every job ID the service accepted is written here before any download
//! starts and removed once its artifact has been stored. Jobs that failed
//! or timed out stay recorded, so a process that dies in between, or a
//! later resume, can still fetch them.

pub mod error;
pub mod record;
pub mod store;

pub use error::RecoveryError;
pub use record::InterruptedDownloadRecord;
pub use store::InterruptedDownloadStore;
