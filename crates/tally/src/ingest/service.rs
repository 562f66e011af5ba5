//! Trigger surface: start runs in the background and answer immediately.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::entity::filter_watermark::Model as FilterWatermarkModel;
use crate::entity::source::Source;
use crate::store;

use super::errors::{OrchestratorError, Result};
use super::orchestrator::Orchestrator;
use super::types::{SourceReport, SourceStatus};

/// Why a trigger could not be accepted at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Source {0} is not enabled")]
    SourceDisabled(Source),
}

/// Handle to a run started by a trigger.
#[derive(Debug)]
pub struct RunHandle {
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Ingestion task panicked or was cancelled");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Immediate answer to a trigger.
#[derive(Debug)]
pub enum TriggerAck {
    /// The run was started in the background.
    Accepted(RunHandle),
    /// A run for the source is already in progress; nothing was started.
    AlreadyRunning,
}

impl TriggerAck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TriggerAck::Accepted(_))
    }

    /// The handle of an accepted run.
    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            TriggerAck::Accepted(handle) => Some(handle),
            TriggerAck::AlreadyRunning => None,
        }
    }
}

fn log_report(report: &SourceReport) {
    let totals = report.totals();
    match &report.status {
        SourceStatus::Failed(message) => {
            tracing::error!(source = %report.source, "Triggered run failed: {}", message);
        }
        status => tracing::info!(
            source = %report.source,
            status = ?status,
            filters = report.filters.len(),
            saved = totals.commits_saved,
            skipped = totals.commits_skipped,
            "Triggered run finished"
        ),
    }
}

/// Fire-and-forget entry points over an [`Orchestrator`].
///
/// Both triggers return as soon as the run is scheduled. Runs for the same
/// source never overlap.
#[derive(Clone)]
pub struct IngestService {
    orchestrator: Arc<Orchestrator>,
}

impl IngestService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Start a run over every enabled source.
    ///
    /// Sources already running are skipped inside the run.
    pub fn trigger_all(&self) -> TriggerAck {
        let orchestrator = Arc::clone(&self.orchestrator);
        tracing::info!("Triggering ingestion for all sources");

        let task = tokio::spawn(async move {
            for report in orchestrator.run_all().await {
                log_report(&report);
            }
        });
        TriggerAck::Accepted(RunHandle { task })
    }

    /// Start a run for one source, named case-insensitively.
    ///
    /// # Errors
    /// - `UnknownSource` if `name` is not a known source
    /// - `SourceDisabled` if the source has no connector
    pub fn trigger_source(&self, name: &str) -> std::result::Result<TriggerAck, TriggerError> {
        let source: Source = name
            .parse()
            .map_err(|_| TriggerError::UnknownSource(name.to_string()))?;
        if !self.orchestrator.is_enabled(source) {
            return Err(TriggerError::SourceDisabled(source));
        }
        if self.orchestrator.is_running(source) {
            tracing::info!(source = %source, "Trigger ignored, source is already running");
            return Ok(TriggerAck::AlreadyRunning);
        }

        tracing::info!(source = %source, "Triggering ingestion");
        let orchestrator = Arc::clone(&self.orchestrator);
        let task = tokio::spawn(async move {
            match orchestrator.run_source(source).await {
                Ok(report) => log_report(&report),
                Err(OrchestratorError::AlreadyRunning(source)) => {
                    tracing::info!(
                        source = %source,
                        "Source started running elsewhere, trigger dropped"
                    );
                }
                Err(e) => tracing::error!(source = %source, error = %e, "Triggered run failed"),
            }
        });
        Ok(TriggerAck::Accepted(RunHandle { task }))
    }

    /// Configured filters and watermarks of a source.
    pub async fn filters(&self, source: Source) -> Result<Vec<FilterWatermarkModel>> {
        Ok(store::watermarks::list(self.orchestrator.db(), source).await?)
    }

    /// Configure a filter. Returns `false` if it already existed.
    pub async fn register_filter(&self, source: Source, filter: &str) -> Result<bool> {
        let filter = filter.trim();
        if filter.is_empty() {
            return Err(OrchestratorError::EmptyFilter);
        }
        Ok(store::watermarks::register(self.orchestrator.db(), source, filter).await?)
    }
}

impl std::fmt::Debug for IngestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestService")
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}
