use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

use crate::connector::{
    CommitStats, CommitSummary, ConnectorError, FetchOutcome, RepositoryDescriptor, SourceConnector,
    pagination, short_sha,
};
use crate::entity::error_kind::ErrorKind;
use crate::entity::filter_watermark::Model as FilterWatermarkModel;
use crate::entity::source::Source;
use crate::retry::retry_not_ready;
use crate::store::{self, ErrorRecorder, Failure, NewCommit, Scope};

use super::errors::{OrchestratorError, Result};
use super::progress::{IngestProgress, ProgressCallback, emit};
use super::types::{
    FilterOutcome, FilterReport, IngestOptions, IngestStats, SourceReport, SourceStatus,
};

/// Pipeline actions named in error contexts.
mod action {
    pub const LIST_REPOS: &str = "List Repos";
    pub const LIST_COMMITS: &str = "List Commits";
    pub const CHECK_EXISTING: &str = "Check Existing Commit";
    pub const FETCH_DETAIL: &str = "Fetch Commit Detail";
    pub const SAVE_COMMIT: &str = "Save Commit";
    pub const REPOSITORY_STATS: &str = "Fetch Repository Stats";
    pub const SAVE_REPOSITORY_STATS: &str = "Save Repository Stats";
    pub const ADVANCE_WATERMARK: &str = "Advance Watermark";
}

/// Render a pipeline location, e.g.
/// `Organization: acme, Repo: acme/core, Commit: abc1234, Action: Fetch Commit Detail`.
fn context(namespace: &str, repo: Option<&str>, sha: Option<&str>, action: &str) -> String {
    let mut parts = vec![format!("Organization: {}", namespace)];
    if let Some(repo) = repo {
        parts.push(format!("Repo: {}", repo));
    }
    if let Some(sha) = sha {
        parts.push(format!("Commit: {}", short_sha(sha)));
    }
    parts.push(format!("Action: {}", action));
    parts.join(", ")
}

fn abort_context(source: Source, filter: &str, location: &str) -> String {
    format!(
        "Orchestration: processing filter '{}' for source '{}'; {}",
        filter,
        source.display_name(),
        location
    )
}

/// Whether a failure inside one repository ends the whole filter.
///
/// Only throttling does. Auth and configuration failures abort only while
/// listing repositories.
fn aborts_filter(error: &ConnectorError) -> bool {
    error.kind() == ErrorKind::RateLimit
}

/// A run-aborting failure and where it happened.
struct Abort {
    error: ConnectorError,
    location: String,
}

/// One enabled source: its connector and its run lock.
struct SourceSlot {
    connector: Arc<dyn SourceConnector>,
    lock: Mutex<()>,
    running: AtomicBool,
}

/// Marks a slot as running until dropped.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-filter state threaded through a walk.
struct FilterRun<'a> {
    connector: &'a dyn SourceConnector,
    filter: &'a str,
    since: DateTime<Utc>,
    stats: IngestStats,
}

impl FilterRun<'_> {
    fn source(&self) -> Source {
        self.connector.source()
    }

    fn scope(&self) -> Scope<'_> {
        Scope::filter(self.source(), self.filter)
    }

    fn context(&self, repo: Option<&str>, sha: Option<&str>, action: &str) -> String {
        context(self.connector.namespace(), repo, sha, action)
    }
}

/// Drives every enabled source's filters through its connector.
///
/// Filters of one source run sequentially. Each source has a run lock; a
/// second run for a source that is already running is rejected.
pub struct Orchestrator {
    db: Arc<DatabaseConnection>,
    sources: Vec<SourceSlot>,
    recorder: ErrorRecorder,
    options: IngestOptions,
    on_progress: Option<ProgressCallback>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl Orchestrator {
    /// Create an orchestrator over the connectors of the enabled sources.
    ///
    /// A second connector for the same source is ignored.
    pub fn new(
        db: Arc<DatabaseConnection>,
        connectors: Vec<Arc<dyn SourceConnector>>,
        options: IngestOptions,
    ) -> Self {
        let mut sources: Vec<SourceSlot> = Vec::with_capacity(connectors.len());
        for connector in connectors {
            if sources.iter().any(|s| s.connector.source() == connector.source()) {
                tracing::warn!(source = %connector.source(), "Duplicate connector ignored");
                continue;
            }
            sources.push(SourceSlot {
                connector,
                lock: Mutex::new(()),
                running: AtomicBool::new(false),
            });
        }

        Self {
            recorder: ErrorRecorder::new(Arc::clone(&db)),
            db,
            sources,
            options,
            on_progress: None,
            shutdown: None,
        }
    }

    /// Report progress through `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Stop starting new filters once `flag` is set.
    #[must_use]
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Sources with a connector, in run order.
    pub fn enabled_sources(&self) -> Vec<Source> {
        self.sources.iter().map(|s| s.connector.source()).collect()
    }

    pub fn is_enabled(&self, source: Source) -> bool {
        self.slot(source).is_some()
    }

    /// Whether a run for `source` is in progress.
    pub fn is_running(&self, source: Source) -> bool {
        self.slot(source)
            .is_some_and(|slot| slot.running.load(Ordering::SeqCst))
    }

    fn slot(&self, source: Source) -> Option<&SourceSlot> {
        self.sources.iter().find(|s| s.connector.source() == source)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn emit(&self, event: IngestProgress) {
        emit(self.on_progress.as_ref(), event);
    }

    /// Run every enabled source in turn.
    ///
    /// Never fails as a whole: each source's result, including "already
    /// running", is reported in its [`SourceReport`].
    pub async fn run_all(&self) -> Vec<SourceReport> {
        let mut reports = Vec::with_capacity(self.sources.len());

        for source in self.enabled_sources() {
            let report = match self.run_source(source).await {
                Ok(report) => report,
                Err(OrchestratorError::AlreadyRunning(source)) => {
                    tracing::warn!(source = %source, "Source is already running, skipping");
                    SourceReport::new(source, SourceStatus::AlreadyRunning)
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Source run failed");
                    SourceReport::new(source, SourceStatus::Failed(e.to_string()))
                }
            };
            reports.push(report);
        }

        reports
    }

    /// Run every configured filter of one source.
    ///
    /// # Errors
    /// - `SourceDisabled` if the source has no connector
    /// - `AlreadyRunning` if another run holds the source's lock
    /// - `Store` if the filters cannot be loaded
    pub async fn run_source(&self, source: Source) -> Result<SourceReport> {
        let slot = self
            .slot(source)
            .ok_or(OrchestratorError::SourceDisabled(source))?;
        let _guard = slot
            .lock
            .try_lock()
            .map_err(|_| OrchestratorError::AlreadyRunning(source))?;
        let _running = RunningGuard::enter(&slot.running);

        let filters = store::watermarks::list(self.db(), source).await?;
        if filters.is_empty() {
            tracing::warn!(
                source = %source,
                "No filters configured for source; register one with `tally filters add`"
            );
            self.emit(IngestProgress::NoFilters { source });
            return Ok(SourceReport::new(source, SourceStatus::NoFilters));
        }

        tracing::info!(source = %source, filters = filters.len(), "Starting source run");
        self.emit(IngestProgress::SourceStarted {
            source,
            filters: filters.len(),
        });

        let mut report = SourceReport::new(source, SourceStatus::Finished);
        let mut remaining = filters.into_iter();

        for row in remaining.by_ref() {
            if self.shutdown_requested() {
                report.not_started.push(row.filter_criteria);
                break;
            }
            let filter_report = self.run_filter(slot.connector.as_ref(), row).await;
            report.filters.push(filter_report);
        }
        report
            .not_started
            .extend(remaining.map(|row| row.filter_criteria));

        if !report.not_started.is_empty() {
            tracing::warn!(
                source = %source,
                remaining = report.not_started.len(),
                "Shutdown requested, remaining filters not started"
            );
            self.emit(IngestProgress::Interrupted {
                source,
                remaining: report.not_started.len(),
            });
            report.status = SourceStatus::Interrupted;
        }

        let completed = report.filters.iter().filter(|f| f.is_completed()).count();
        let aborted = report.filters.len() - completed;
        tracing::info!(source = %source, completed, aborted, "Source run finished");
        self.emit(IngestProgress::SourceCompleted {
            source,
            completed,
            aborted,
        });

        Ok(report)
    }

    /// Run one filter and advance its watermark if the walk completes.
    async fn run_filter(
        &self,
        connector: &dyn SourceConnector,
        row: FilterWatermarkModel,
    ) -> FilterReport {
        let source = connector.source();
        let filter = row.filter_criteria;
        let since = row
            .last_fetch_at
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or(self.options.default_since);
        let started_at = Utc::now();

        tracing::info!(source = %source, filter = %filter, since = %since, "Processing filter");
        self.emit(IngestProgress::FilterStarted {
            source,
            filter: filter.clone(),
            since,
        });

        let mut run = FilterRun {
            connector,
            filter: &filter,
            since,
            stats: IngestStats::default(),
        };
        let walked = self.walk(&mut run).await;
        let stats = run.stats;

        let outcome = match walked {
            Ok(()) => match store::watermarks::set(self.db(), source, &filter, started_at).await {
                Ok(()) => FilterOutcome::Completed(stats),
                Err(e) => {
                    let location = context(
                        connector.namespace(),
                        None,
                        None,
                        action::ADVANCE_WATERMARK,
                    );
                    let failure = Failure::new(ErrorKind::Unknown, e.to_string());
                    self.recorder
                        .record(
                            Scope::filter(source, &filter),
                            &abort_context(source, &filter, &location),
                            failure.clone(),
                        )
                        .await;
                    FilterOutcome::Aborted {
                        kind: failure.kind,
                        message: failure.message,
                        stats,
                    }
                }
            },
            Err(abort) => {
                self.recorder
                    .record_error(
                        Scope::filter(source, &filter),
                        &abort_context(source, &filter, &abort.location),
                        &abort.error,
                    )
                    .await;
                FilterOutcome::Aborted {
                    kind: abort.error.kind(),
                    message: abort.error.to_string(),
                    stats,
                }
            }
        };

        match &outcome {
            FilterOutcome::Completed(stats) => {
                tracing::info!(
                    source = %source,
                    filter = %filter,
                    repositories = stats.repositories_seen,
                    saved = stats.commits_saved,
                    already_present = stats.commits_already_present,
                    skipped = stats.commits_skipped,
                    watermark = %started_at,
                    "Filter completed"
                );
                self.emit(IngestProgress::FilterCompleted {
                    source,
                    filter: filter.clone(),
                    stats: *stats,
                });
            }
            FilterOutcome::Aborted { kind, message, .. } => {
                tracing::error!(
                    source = %source,
                    filter = %filter,
                    kind = %kind,
                    "Filter aborted, watermark unchanged: {}",
                    message
                );
                self.emit(IngestProgress::FilterAborted {
                    source,
                    filter: filter.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }

        FilterReport {
            filter,
            since,
            started_at,
            outcome,
        }
    }

    /// Walk every matching repository. Any repository listing failure aborts.
    async fn walk(&self, run: &mut FilterRun<'_>) -> std::result::Result<(), Abort> {
        let connector = run.connector;
        let filter = run.filter;
        let mut repositories = pagination::repositories(connector, filter);

        loop {
            let repo = match repositories.try_next().await {
                Ok(Some(repo)) => repo,
                Ok(None) => break,
                Err(error) => {
                    return Err(Abort {
                        error,
                        location: run.context(None, None, action::LIST_REPOS),
                    });
                }
            };

            run.stats.repositories_seen += 1;
            self.process_repository(run, &repo).await?;
        }

        if run.stats.repositories_seen == 0 {
            tracing::info!(
                source = %run.source(),
                filter = %filter,
                "No repositories matched filter"
            );
        }
        Ok(())
    }

    /// Ingest one repository's in-window commits.
    ///
    /// Only throttling is returned; anything else is recorded and the
    /// repository (or commit) is skipped.
    async fn process_repository(
        &self,
        run: &mut FilterRun<'_>,
        repo: &RepositoryDescriptor,
    ) -> std::result::Result<(), Abort> {
        let source = run.source();
        tracing::debug!(
            source = %source,
            repo = %repo.full_name,
            since = %run.since,
            "Listing commits"
        );
        self.emit(IngestProgress::RepositoryStarted {
            source,
            repository: repo.full_name.clone(),
        });

        let connector = run.connector;
        let mut commits = pagination::commits_since(connector, repo, run.since);

        loop {
            let commit = match commits.try_next().await {
                Ok(Some(commit)) => commit,
                Ok(None) => break,
                Err(error) => {
                    let location =
                        run.context(Some(&repo.full_name), None, action::LIST_COMMITS);
                    if aborts_filter(&error) {
                        return Err(Abort { error, location });
                    }
                    tracing::warn!(
                        source = %source,
                        repo = %repo.full_name,
                        kind = %error.kind(),
                        "Skipping repository: {}",
                        error
                    );
                    self.recorder.record_error(run.scope(), &location, &error).await;
                    run.stats.repositories_skipped += 1;
                    self.emit(IngestProgress::RepositorySkipped {
                        source,
                        repository: repo.full_name.clone(),
                        error: error.to_string(),
                    });
                    return Ok(());
                }
            };

            run.stats.commits_seen += 1;
            self.process_commit(run, repo, commit).await?;
        }

        if self.options.repository_stats {
            self.collect_repository_stats(run, repo).await?;
        }
        Ok(())
    }

    async fn process_commit(
        &self,
        run: &mut FilterRun<'_>,
        repo: &RepositoryDescriptor,
        commit: CommitSummary,
    ) -> std::result::Result<(), Abort> {
        let source = run.source();
        let connector = run.connector;

        match store::commits::exists(self.db(), source, &repo.full_name, &commit.sha).await {
            Ok(true) => {
                tracing::trace!(
                    repo = %repo.full_name,
                    sha = %commit.short_sha(),
                    "Commit already stored"
                );
                run.stats.commits_already_present += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                let location =
                    run.context(Some(&repo.full_name), Some(&commit.sha), action::CHECK_EXISTING);
                let failure = Failure::new(ErrorKind::Unknown, e.to_string());
                self.skip_commit(run, repo, &commit, &location, failure).await;
                return Ok(());
            }
        }

        let resource = format!("commit {} of {}", commit.short_sha(), repo.full_name);
        let detail = retry_not_ready(self.options.not_ready, &resource, || {
            connector.fetch_commit_detail(repo, &commit.sha)
        })
        .await;
        let location = run.context(Some(&repo.full_name), Some(&commit.sha), action::FETCH_DETAIL);

        let stats = match detail {
            FetchOutcome::Data(stats) => stats,
            FetchOutcome::Empty => {
                tracing::info!(
                    repo = %repo.full_name,
                    sha = %commit.short_sha(),
                    "Commit detail not found, saving without statistics"
                );
                self.recorder
                    .record_error(run.scope(), &location, &ConnectorError::not_found(resource))
                    .await;
                CommitStats::unavailable()
            }
            FetchOutcome::Failed(error) if aborts_filter(&error) => {
                return Err(Abort { error, location });
            }
            FetchOutcome::Retryable(error) | FetchOutcome::Failed(error) => {
                self.skip_commit(run, repo, &commit, &location, Failure::from(&error))
                    .await;
                return Ok(());
            }
        };

        let sha = commit.sha.clone();
        let record = NewCommit::new(source, repo.full_name.clone(), commit, stats);
        match store::commits::save(self.db(), record).await {
            Ok(true) => {
                run.stats.commits_saved += 1;
                tracing::debug!(repo = %repo.full_name, sha = %short_sha(&sha), "Saved commit");
                self.emit(IngestProgress::CommitSaved {
                    source,
                    repository: repo.full_name.clone(),
                    sha,
                });
            }
            Ok(false) => run.stats.commits_already_present += 1,
            Err(e) => {
                let location =
                    run.context(Some(&repo.full_name), Some(&sha), action::SAVE_COMMIT);
                tracing::warn!(
                    repo = %repo.full_name,
                    sha = %short_sha(&sha),
                    error = %e,
                    "Skipping commit"
                );
                self.recorder
                    .record(run.scope(), &location, Failure::new(ErrorKind::Unknown, e.to_string()))
                    .await;
                run.stats.commits_skipped += 1;
            }
        }
        Ok(())
    }

    async fn skip_commit(
        &self,
        run: &mut FilterRun<'_>,
        repo: &RepositoryDescriptor,
        commit: &CommitSummary,
        location: &str,
        failure: Failure,
    ) {
        tracing::warn!(
            source = %run.source(),
            repo = %repo.full_name,
            sha = %commit.short_sha(),
            kind = %failure.kind,
            "Skipping commit: {}",
            failure.message
        );
        self.emit(IngestProgress::CommitSkipped {
            source: run.source(),
            repository: repo.full_name.clone(),
            sha: commit.sha.clone(),
            kind: failure.kind,
        });
        self.recorder.record(run.scope(), location, failure).await;
        run.stats.commits_skipped += 1;
    }

    async fn collect_repository_stats(
        &self,
        run: &mut FilterRun<'_>,
        repo: &RepositoryDescriptor,
    ) -> std::result::Result<(), Abort> {
        let source = run.source();
        let connector = run.connector;
        let resource = format!("repository stats of {}", repo.full_name);
        let location = run.context(Some(&repo.full_name), None, action::REPOSITORY_STATS);

        let outcome = retry_not_ready(self.options.not_ready, &resource, || {
            connector.fetch_repository_stats(repo)
        })
        .await;

        match outcome {
            FetchOutcome::Data(activity) => {
                match store::repository_stats::upsert(self.db(), source, &repo.full_name, activity)
                    .await
                {
                    Ok(()) => run.stats.repository_stats_updated += 1,
                    Err(e) => {
                        let location = run.context(
                            Some(&repo.full_name),
                            None,
                            action::SAVE_REPOSITORY_STATS,
                        );
                        self.recorder
                            .record(
                                run.scope(),
                                &location,
                                Failure::new(ErrorKind::Unknown, e.to_string()),
                            )
                            .await;
                    }
                }
            }
            FetchOutcome::Empty => {
                tracing::info!(repo = %repo.full_name, "No repository statistics available");
            }
            FetchOutcome::Failed(error) if aborts_filter(&error) => {
                return Err(Abort { error, location });
            }
            FetchOutcome::Retryable(error) | FetchOutcome::Failed(error) => {
                tracing::warn!(
                    repo = %repo.full_name,
                    kind = %error.kind(),
                    "Repository statistics unavailable: {}",
                    error
                );
                self.recorder.record_error(run.scope(), &location, &error).await;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("sources", &self.enabled_sources())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
