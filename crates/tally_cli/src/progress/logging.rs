use tally::ingest::IngestProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: IngestProgress) {
        match event {
            IngestProgress::SourceStarted { source, filters } => {
                tracing::info!(source = %source, filters, "Ingesting source");
            }

            IngestProgress::NoFilters { source } => {
                tracing::warn!(source = %source, "No filters configured");
            }

            IngestProgress::FilterStarted {
                source,
                filter,
                since,
            } => {
                tracing::info!(
                    source = %source,
                    filter = %filter,
                    since = %since,
                    "Filter started"
                );
            }

            IngestProgress::RepositoryStarted { source, repository } => {
                tracing::debug!(source = %source, repo = %repository, "Repository started");
            }

            IngestProgress::RepositorySkipped {
                source,
                repository,
                error,
            } => {
                tracing::warn!(
                    source = %source,
                    repo = %repository,
                    error = %error,
                    "Repository skipped"
                );
            }

            IngestProgress::CommitSaved {
                repository, sha, ..
            } => {
                tracing::debug!(repo = %repository, sha = %sha, "Commit saved");
            }

            IngestProgress::CommitSkipped {
                repository,
                sha,
                kind,
                ..
            } => {
                tracing::warn!(repo = %repository, sha = %sha, kind = %kind, "Commit skipped");
            }

            IngestProgress::FilterCompleted {
                source,
                filter,
                stats,
            } => {
                tracing::info!(
                    source = %source,
                    filter = %filter,
                    repositories = stats.repositories_seen,
                    saved = stats.commits_saved,
                    skipped = stats.commits_skipped,
                    "Filter completed"
                );
            }

            IngestProgress::FilterAborted {
                source,
                filter,
                kind,
                message,
            } => {
                tracing::error!(
                    source = %source,
                    filter = %filter,
                    kind = %kind,
                    error = %message,
                    "Filter aborted"
                );
            }

            IngestProgress::Interrupted { source, remaining } => {
                tracing::warn!(source = %source, remaining, "Interrupted");
            }

            IngestProgress::SourceCompleted {
                source,
                completed,
                aborted,
            } => {
                tracing::info!(source = %source, completed, aborted, "Source finished");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
