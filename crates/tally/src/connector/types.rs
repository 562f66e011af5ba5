use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::entity::source::Source;

use super::errors::{ConnectorError, Result};

/// A repository matched by a filter. Lives for one orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    /// `owner/name` or `workspace/slug`; the identity used in commit records.
    pub full_name: String,
    /// Display name the filter was matched against.
    pub name: String,
    /// URL path segment the provider addresses the repository by.
    pub slug: String,
    /// Bitbucket project key, when the provider reports one.
    pub project_key: Option<String>,
}

/// Commit fields available from a provider's commit listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl CommitSummary {
    /// First seven characters of the SHA.
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

/// First seven characters of a SHA, or the whole thing if shorter.
pub fn short_sha(sha: &str) -> &str {
    sha.char_indices().nth(7).map_or(sha, |(i, _)| &sha[..i])
}

/// Per-commit statistics from the detail call.
///
/// `None` fields mean the provider could not supply the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub lines_added: Option<u32>,
    pub lines_removed: Option<u32>,
    pub files_changed: Option<u32>,
}

impl CommitStats {
    pub fn new(lines_added: u32, lines_removed: u32, files_changed: u32) -> Self {
        Self {
            lines_added: Some(lines_added),
            lines_removed: Some(lines_removed),
            files_changed: Some(files_changed),
        }
    }

    /// Stats for providers that cannot report them.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// Repository-wide aggregates from a provider's statistics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryActivity {
    pub total_commits: u64,
    pub contributor_count: u32,
}

/// Where a page fetch should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Build the first-page URL from the connector's own settings.
    First,
    /// Follow a provider-supplied next reference.
    Next(Url),
}

/// One page of results plus the validated reference to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Url>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }
}

/// Order a provider returns commits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOrdering {
    /// Reverse-chronological. The first commit older than `since` ends the walk.
    NewestFirst,
    /// No usable order. Every page is read and old commits are dropped one by one.
    Unspecified,
}

/// Result of a single provider call.
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    Data(T),
    /// Resource absent, or present but holding nothing.
    Empty,
    /// Provider asked us to come back later.
    Retryable(ConnectorError),
    /// Non-retryable failure; [`ConnectorError::is_run_aborting`] decides its reach.
    Failed(ConnectorError),
}

impl<T> FetchOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            Self::Data(value) => FetchOutcome::Data(f(value)),
            Self::Empty => FetchOutcome::Empty,
            Self::Retryable(err) => FetchOutcome::Retryable(err),
            Self::Failed(err) => FetchOutcome::Failed(err),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Collapse for listing calls, where "not ready" is just another failure.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Self::Data(value) => Ok(Some(value)),
            Self::Empty => Ok(None),
            Self::Retryable(err) | Self::Failed(err) => Err(err),
        }
    }
}

/// Capability interface over a commit-history provider.
///
/// The orchestrator is written against this trait only. Lazy sequences over
/// the page functions live in [`crate::connector::pagination`].
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source(&self) -> Source;

    /// Organization or workspace this connector reads from.
    fn namespace(&self) -> &str;

    fn commit_ordering(&self) -> CommitOrdering;

    /// One page of repositories whose name contains `filter`.
    async fn list_repositories_page(
        &self,
        filter: &str,
        page: PageRequest,
    ) -> Result<Page<RepositoryDescriptor>>;

    /// One page of commits, newest first when the provider allows it.
    async fn list_commits_page(
        &self,
        repo: &RepositoryDescriptor,
        since: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<CommitSummary>>;

    async fn fetch_commit_detail(
        &self,
        repo: &RepositoryDescriptor,
        sha: &str,
    ) -> FetchOutcome<CommitStats>;

    /// Repository aggregates. Providers without a stats endpoint report `Empty`.
    async fn fetch_repository_stats(
        &self,
        _repo: &RepositoryDescriptor,
    ) -> FetchOutcome<RepositoryActivity> {
        FetchOutcome::Empty
    }
}
