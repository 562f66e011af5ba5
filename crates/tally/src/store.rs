//! Persistence-backed lookups used by the orchestrator.
//!
//! - [`commits`] - dedup index over commit records
//! - [`watermarks`] - per-filter progress and the filter registry
//! - [`recorder`] - the error recorder
//! - [`repository_stats`] - repository aggregates

pub mod commits;
mod errors;
pub mod recorder;
pub mod repository_stats;
pub mod watermarks;

pub use commits::NewCommit;
pub use errors::{Result, StoreError};
pub use recorder::{ErrorRecorder, Failure, Scope};
