//! Incremental ingestion: filters, watermarks and the per-source run loop.
//!
//! [`Orchestrator`] walks every configured filter of a source through its
//! connector, deduplicates commits, records failures and advances each
//! filter's watermark only when the walk completes. [`IngestService`] wraps
//! it for fire-and-forget triggers.

mod errors;
mod orchestrator;
mod progress;
mod service;
mod types;

pub use errors::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use progress::{IngestProgress, ProgressCallback, emit};
pub use service::{IngestService, RunHandle, TriggerAck, TriggerError};
pub use types::{
    DEFAULT_SINCE_TIMESTAMP, FilterOutcome, FilterReport, IngestOptions, IngestStats,
    SourceReport, SourceStatus, default_since,
};
