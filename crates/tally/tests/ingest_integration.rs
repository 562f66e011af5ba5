//! End-to-end ingestion runs against a scripted connector and in-memory SQLite.
//!
//! Key scenarios tested:
//! - A fresh filter saves every in-window commit and advances its watermark
//! - Re-running over the same window writes nothing new and advances the watermark again
//! - Throttling on a later listing page aborts without touching the watermark
//! - One failing or forbidden repository does not stop its siblings
//! - Not-ready commit details are retried within the configured budget
//! - Newest-first listings stop paging at the first old commit
//! - Overlapping runs for one source are rejected

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use tokio::sync::Notify;
use url::Url;

use tally::connect_and_migrate;
use tally::connector::{
    CommitOrdering, CommitStats, CommitSummary, ConnectorError, FetchOutcome, Page, PageRequest,
    RateLimitInfo, RepositoryDescriptor, SourceConnector,
};
use tally::entity::error_kind::ErrorKind;
use tally::entity::source::Source;
use tally::ingest::{
    FilterOutcome, IngestOptions, IngestProgress, IngestService, Orchestrator,
    OrchestratorError, SourceStatus, TriggerAck, default_since,
};
use tally::retry::NotReadyPolicy;
use tally::store::{self, NewCommit, recorder};

/// Maximum time any run should take in tests.
const RUN_TIMEOUT: Duration = Duration::from_secs(10);

const BASE: &str = "https://scripted.test";

type Script<T> = Vec<Result<Page<T>, ConnectorError>>;

/// Connector that replays canned pages and records every call.
struct ScriptedConnector {
    ordering: CommitOrdering,
    repositories: Script<RepositoryDescriptor>,
    commits: HashMap<String, Script<CommitSummary>>,
    details: Mutex<HashMap<String, VecDeque<FetchOutcome<CommitStats>>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedConnector {
    fn new(ordering: CommitOrdering) -> Self {
        Self {
            ordering,
            repositories: Vec::new(),
            commits: HashMap::new(),
            details: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Serve `pages` in order; each page links to the next.
    fn with_repositories(
        mut self,
        pages: Vec<Result<Vec<RepositoryDescriptor>, ConnectorError>>,
    ) -> Self {
        self.repositories = chain("repos", pages);
        self
    }

    fn with_commits(
        mut self,
        repo: &str,
        pages: Vec<Result<Vec<CommitSummary>, ConnectorError>>,
    ) -> Self {
        let prefix = format!("commits/{}", repo.replace('/', "-"));
        self.commits.insert(repo.to_string(), chain(&prefix, pages));
        self
    }

    fn with_details(self, sha: &str, outcomes: Vec<FetchOutcome<CommitStats>>) -> Self {
        self.details
            .lock()
            .unwrap()
            .insert(sha.to_string(), outcomes.into());
        self
    }

    fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn detail_calls(&self, sha: &str) -> usize {
        let needle = format!("detail:{sha}");
        self.calls().iter().filter(|c| **c == needle).count()
    }
}

fn page_url(prefix: &str, index: usize) -> Url {
    Url::parse(&format!("{BASE}/{prefix}/{index}")).unwrap()
}

fn chain<T>(prefix: &str, pages: Vec<Result<Vec<T>, ConnectorError>>) -> Script<T> {
    let count = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(index, page)| {
            page.map(|items| Page {
                items,
                next: (index + 1 < count).then(|| page_url(prefix, index + 1)),
            })
        })
        .collect()
}

fn page_index(page: &PageRequest) -> usize {
    match page {
        PageRequest::First => 0,
        PageRequest::Next(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.parse().ok())
            .unwrap(),
    }
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    fn source(&self) -> Source {
        Source::GitHub
    }

    fn namespace(&self) -> &str {
        "acme"
    }

    fn commit_ordering(&self) -> CommitOrdering {
        self.ordering
    }

    async fn list_repositories_page(
        &self,
        _filter: &str,
        page: PageRequest,
    ) -> tally::connector::Result<Page<RepositoryDescriptor>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let index = page_index(&page);
        self.log(format!("repos:{index}"));
        self.repositories
            .get(index)
            .cloned()
            .unwrap_or_else(|| Ok(Page::empty()))
    }

    async fn list_commits_page(
        &self,
        repo: &RepositoryDescriptor,
        _since: DateTime<Utc>,
        page: PageRequest,
    ) -> tally::connector::Result<Page<CommitSummary>> {
        let index = page_index(&page);
        self.log(format!("commits:{}:{index}", repo.full_name));
        self.commits
            .get(&repo.full_name)
            .and_then(|pages| pages.get(index))
            .cloned()
            .unwrap_or_else(|| Ok(Page::empty()))
    }

    async fn fetch_commit_detail(
        &self,
        _repo: &RepositoryDescriptor,
        sha: &str,
    ) -> FetchOutcome<CommitStats> {
        self.log(format!("detail:{sha}"));
        self.details
            .lock()
            .unwrap()
            .get_mut(sha)
            .and_then(VecDeque::pop_front)
            .unwrap_or(FetchOutcome::Data(CommitStats::new(3, 1, 2)))
    }
}

fn repo(name: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        full_name: format!("acme/{name}"),
        name: name.to_string(),
        slug: name.to_string(),
        project_key: None,
    }
}

fn commit(sha: &str, day: u32) -> CommitSummary {
    CommitSummary {
        sha: sha.to_string(),
        author_name: "Ada".to_string(),
        author_email: Some("ada@example.com".to_string()),
        committed_at: at(2024, 3, day),
    }
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn not_ready(sha: &str) -> FetchOutcome<CommitStats> {
    FetchOutcome::Retryable(ConnectorError::NotReady {
        status: 202,
        resource: format!("commit {sha}"),
    })
}

fn forbidden() -> ConnectorError {
    ConnectorError::Auth {
        status: 403,
        message: "Resource not accessible by integration".to_string(),
    }
}

fn rate_limited() -> ConnectorError {
    ConnectorError::RateLimited {
        status: 429,
        limit: RateLimitInfo::default(),
    }
}

fn options(max_attempts: u32) -> IngestOptions {
    IngestOptions {
        not_ready: NotReadyPolicy::new(max_attempts, Duration::from_millis(1)),
        repository_stats: false,
        ..IngestOptions::default()
    }
}

async fn setup(filters: &[&str]) -> Arc<DatabaseConnection> {
    let db = connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    for filter in filters {
        store::watermarks::register(&db, Source::GitHub, filter)
            .await
            .unwrap();
    }
    Arc::new(db)
}

/// Two repositories with three in-window commits each.
fn two_repositories() -> ScriptedConnector {
    ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core-api"), repo("core-web")])])
        .with_commits(
            "acme/core-api",
            vec![Ok(vec![commit("a3", 3), commit("a2", 2), commit("a1", 1)])],
        )
        .with_commits(
            "acme/core-web",
            vec![Ok(vec![commit("w3", 3), commit("w2", 2), commit("w1", 1)])],
        )
}

async fn commit_count(db: &DatabaseConnection) -> u64 {
    store::commits::count_by_source(db, Source::GitHub)
        .await
        .unwrap()
}

async fn errors_of(db: &DatabaseConnection, kind: ErrorKind) -> usize {
    recorder::by_kind(db, kind).await.unwrap().len()
}

async fn watermark(db: &DatabaseConnection, filter: &str) -> Option<DateTime<Utc>> {
    store::watermarks::get(db, Source::GitHub, filter)
        .await
        .unwrap()
}

// ─── Watermark Advance ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_filter_saves_all_commits_and_advances_watermark() {
    let db = setup(&["core"]).await;
    let saved_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saved_events);
    let orchestrator = Orchestrator::new(
        db.clone(),
        vec![Arc::new(two_repositories())],
        options(4),
    )
    .with_progress(Box::new(move |event| {
        if let IngestProgress::CommitSaved { .. } = event {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let report = tokio::time::timeout(RUN_TIMEOUT, orchestrator.run_source(Source::GitHub))
        .await
        .expect("run should not hang")
        .unwrap();

    let filter = &report.filters[0];
    assert_eq!(filter.since, default_since());
    assert!(filter.is_completed());
    assert_eq!(filter.stats().repositories_seen, 2);
    assert_eq!(filter.stats().commits_saved, 6);
    assert_eq!(commit_count(&db).await, 6);
    assert_eq!(saved_events.load(Ordering::SeqCst), 6);

    let advanced = watermark(&db, "core").await.expect("watermark set");
    assert_eq!(advanced.timestamp(), filter.started_at.timestamp());
    assert_eq!(errors_of(&db, ErrorKind::Unknown).await, 0);
}

#[tokio::test]
async fn test_rerun_over_same_window_writes_nothing_new() {
    let db = setup(&["core"]).await;
    let connector = Arc::new(two_repositories());
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));

    orchestrator.run_source(Source::GitHub).await.unwrap();
    assert_eq!(commit_count(&db).await, 6);
    let first = watermark(&db, "core").await.expect("first run sets watermark");

    // Reopen the same window so every commit is listed again.
    store::watermarks::set(db.as_ref(), Source::GitHub, "core", default_since())
        .await
        .unwrap();
    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    let filter = &report.filters[0];
    assert!(filter.is_completed());
    assert_eq!(filter.stats().commits_saved, 0);
    assert_eq!(filter.stats().commits_already_present, 6);
    assert_eq!(commit_count(&db).await, 6);
    assert_eq!(connector.detail_calls("a3"), 1);

    let second = watermark(&db, "core").await.expect("second run sets watermark");
    assert!(second >= first);
    assert_eq!(second.timestamp(), filter.started_at.timestamp());
}

#[tokio::test]
async fn test_stored_commit_skips_detail_fetch() {
    let db = setup(&["core"]).await;
    store::commits::save(
        db.as_ref(),
        NewCommit::new(
            Source::GitHub,
            "acme/core-api".to_string(),
            commit("a2", 2),
            CommitStats::new(1, 1, 1),
        ),
    )
    .await
    .unwrap();

    let connector = Arc::new(two_repositories());
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));
    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert_eq!(report.filters[0].stats().commits_already_present, 1);
    assert_eq!(report.filters[0].stats().commits_saved, 5);
    assert_eq!(connector.detail_calls("a2"), 0);
    assert_eq!(commit_count(&db).await, 6);
}

// ─── Failure Policy ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limit_on_second_listing_page_aborts_run() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core-api")]), Err(rate_limited())])
        .with_commits("acme/core-api", vec![Ok(vec![commit("a1", 1)])]);
    let orchestrator = Orchestrator::new(db.clone(), vec![Arc::new(connector)], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert!(matches!(
        report.filters[0].outcome,
        FilterOutcome::Aborted {
            kind: ErrorKind::RateLimit,
            ..
        }
    ));
    // Commits written before the throttle stay.
    assert_eq!(commit_count(&db).await, 1);
    assert_eq!(watermark(&db, "core").await, None);
    assert_eq!(errors_of(&db, ErrorKind::RateLimit).await, 1);
}

#[tokio::test]
async fn test_failing_repository_does_not_stop_siblings() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core-a"), repo("core-b"), repo("core-c")])])
        .with_commits("acme/core-a", vec![Ok(vec![commit("a1", 1)])])
        .with_commits(
            "acme/core-b",
            vec![Err(ConnectorError::Network("connection reset".to_string()))],
        )
        .with_commits("acme/core-c", vec![Ok(vec![commit("c1", 1), commit("c0", 1)])]);
    let orchestrator = Orchestrator::new(db.clone(), vec![Arc::new(connector)], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    let filter = &report.filters[0];
    assert!(filter.is_completed());
    assert_eq!(filter.stats().repositories_seen, 3);
    assert_eq!(filter.stats().repositories_skipped, 1);
    assert_eq!(commit_count(&db).await, 3);
    assert!(watermark(&db, "core").await.is_some());

    let network = recorder::by_kind(&db, ErrorKind::Network).await.unwrap();
    assert_eq!(network.len(), 1);
    assert!(network[0].context.contains("Repo: acme/core-b"));
    assert!(network[0].context.contains("Action: List Commits"));
}

#[tokio::test]
async fn test_forbidden_repository_does_not_stop_siblings() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core-a"), repo("core-b"), repo("core-c")])])
        .with_commits("acme/core-a", vec![Ok(vec![commit("a1", 1)])])
        .with_commits("acme/core-b", vec![Err(forbidden())])
        .with_commits("acme/core-c", vec![Ok(vec![commit("c1", 2), commit("c0", 1)])])
        .with_details("c0", vec![FetchOutcome::Failed(forbidden())]);
    let orchestrator = Orchestrator::new(db.clone(), vec![Arc::new(connector)], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    let filter = &report.filters[0];
    assert!(filter.is_completed());
    assert_eq!(filter.stats().repositories_seen, 3);
    assert_eq!(filter.stats().repositories_skipped, 1);
    assert_eq!(filter.stats().commits_saved, 2);
    assert_eq!(filter.stats().commits_skipped, 1);
    assert_eq!(commit_count(&db).await, 2);
    assert!(watermark(&db, "core").await.is_some());

    let denied = recorder::by_kind(&db, ErrorKind::AuthOrConfig).await.unwrap();
    assert_eq!(denied.len(), 2);
    assert!(denied.iter().all(|e| e.status_code == Some(403)));
    assert!(denied.iter().any(|e| e.context.contains("Repo: acme/core-b")));
    assert!(denied.iter().any(|e| e.context.contains("Commit: c0")));
}

#[tokio::test]
async fn test_forbidden_repository_listing_aborts_filter() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Err(forbidden())]);
    let orchestrator = Orchestrator::new(db.clone(), vec![Arc::new(connector)], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert!(matches!(
        report.filters[0].outcome,
        FilterOutcome::Aborted {
            kind: ErrorKind::AuthOrConfig,
            ..
        }
    ));
    assert_eq!(watermark(&db, "core").await, None);
    assert_eq!(errors_of(&db, ErrorKind::AuthOrConfig).await, 1);
}

#[tokio::test]
async fn test_not_ready_detail_within_budget_is_saved() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core")])])
        .with_commits("acme/core", vec![Ok(vec![commit("slow", 2), commit("fast", 1)])])
        .with_details(
            "slow",
            vec![not_ready("slow"), not_ready("slow"), not_ready("slow")],
        );
    let connector = Arc::new(connector);
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert_eq!(report.filters[0].stats().commits_saved, 2);
    assert_eq!(connector.detail_calls("slow"), 4);
    assert_eq!(errors_of(&db, ErrorKind::TransientNotReady).await, 0);
}

#[tokio::test]
async fn test_not_ready_detail_beyond_budget_is_skipped() {
    let db = setup(&["core"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core")])])
        .with_commits("acme/core", vec![Ok(vec![commit("slow", 2), commit("fast", 1)])])
        .with_details(
            "slow",
            vec![not_ready("slow"), not_ready("slow"), not_ready("slow")],
        );
    let connector = Arc::new(connector);
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(2));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    let stats = report.filters[0].stats();
    assert!(report.filters[0].is_completed());
    assert_eq!(stats.commits_saved, 1);
    assert_eq!(stats.commits_skipped, 1);
    assert_eq!(connector.detail_calls("slow"), 2);
    assert_eq!(errors_of(&db, ErrorKind::TransientNotReady).await, 1);
}

// ─── Pagination ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_newest_first_listing_stops_at_first_old_commit() {
    let db = setup(&["core"]).await;
    let mut old = commit("old", 1);
    old.committed_at = at(2023, 12, 30);
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core")])])
        .with_commits(
            "acme/core",
            vec![
                Ok(vec![commit("new", 2), old]),
                Ok(vec![commit("never", 1)]),
            ],
        );
    let connector = Arc::new(connector);
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert_eq!(report.filters[0].stats().commits_saved, 1);
    let calls = connector.calls();
    assert!(calls.contains(&"commits:acme/core:0".to_string()));
    assert!(!calls.contains(&"commits:acme/core:1".to_string()));
    assert_eq!(connector.detail_calls("old"), 0);
}

#[tokio::test]
async fn test_unordered_listing_reads_every_page_and_drops_old_commits() {
    let db = setup(&["core"]).await;
    let mut old = commit("old", 1);
    old.committed_at = at(2023, 6, 1);
    let connector = ScriptedConnector::new(CommitOrdering::Unspecified)
        .with_repositories(vec![Ok(vec![repo("core")])])
        .with_commits(
            "acme/core",
            vec![Ok(vec![old, commit("mid", 2)]), Ok(vec![commit("late", 3)])],
        );
    let connector = Arc::new(connector);
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    assert_eq!(report.filters[0].stats().commits_saved, 2);
    assert!(connector.calls().contains(&"commits:acme/core:1".to_string()));
    assert_eq!(connector.detail_calls("old"), 0);
}

// ─── Run Control ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_source_without_filters_does_nothing() {
    let db = setup(&[]).await;
    let connector = Arc::new(two_repositories());
    let orchestrator = Orchestrator::new(db.clone(), vec![connector.clone()], options(4));

    let reports = orchestrator.run_all().await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, SourceStatus::NoFilters);
    assert!(connector.calls().is_empty());
}

#[tokio::test]
async fn test_each_filter_keeps_its_own_watermark() {
    let db = setup(&["core", "web"]).await;
    let connector = ScriptedConnector::new(CommitOrdering::NewestFirst)
        .with_repositories(vec![Ok(vec![repo("core")]), Err(rate_limited())]);
    let orchestrator = Orchestrator::new(db.clone(), vec![Arc::new(connector)], options(4));

    let report = orchestrator.run_source(Source::GitHub).await.unwrap();

    // The scripted listing ignores the filter, so both filters hit the throttle.
    assert_eq!(report.filters.len(), 2);
    assert!(report.filters.iter().all(|f| !f.is_completed()));
    assert_eq!(watermark(&db, "core").await, None);
    assert_eq!(watermark(&db, "web").await, None);
    assert_eq!(errors_of(&db, ErrorKind::RateLimit).await, 2);
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let db = setup(&["core"]).await;
    let gate = Arc::new(Notify::new());
    let connector = two_repositories().with_gate(Arc::clone(&gate));
    let service = IngestService::new(Orchestrator::new(
        db.clone(),
        vec![Arc::new(connector)],
        options(4),
    ));

    let first = service
        .trigger_source("github")
        .unwrap()
        .into_handle()
        .expect("first trigger accepted");

    tokio::time::timeout(RUN_TIMEOUT, async {
        while !service.orchestrator().is_running(Source::GitHub) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first run should start");

    assert!(matches!(
        service.trigger_source("GitHub").unwrap(),
        TriggerAck::AlreadyRunning
    ));
    assert!(matches!(
        service.orchestrator().run_source(Source::GitHub).await,
        Err(OrchestratorError::AlreadyRunning(Source::GitHub))
    ));

    gate.notify_one();
    tokio::time::timeout(RUN_TIMEOUT, first.wait())
        .await
        .expect("first run should finish");

    assert!(!service.orchestrator().is_running(Source::GitHub));
    assert_eq!(commit_count(&db).await, 6);
}
