use thiserror::Error;

use crate::entity::source::Source;
use crate::store::StoreError;

/// Errors that stop a source run from starting or finishing.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// The source has no connector configured.
    #[error("Source {0} is not enabled")]
    SourceDisabled(Source),

    /// A run for the source is already in progress.
    #[error("Source {0} is already running")]
    AlreadyRunning(Source),

    /// Filters must name a non-empty substring.
    #[error("Filter must not be empty")]
    EmptyFilter,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sea_orm::DbErr> for OrchestratorError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Store(StoreError::from(err))
    }
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
