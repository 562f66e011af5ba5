use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::connector::{
    ApiClient, ApiRateLimiter, CommitOrdering, CommitStats, CommitSummary, ConnectorError,
    FetchOutcome, Page, PageRequest, RepositoryActivity, RepositoryDescriptor, Result,
    SourceConnector, rate_limits,
};
use crate::entity::source::Source;
use crate::http::HttpTransport;

use super::convert::{to_activity, to_commit_stats, to_commit_summary, to_repository};
use super::pagination::next_link;
use super::types::{
    API_VERSION, ContributorActivity, GITHUB_API_URL, GitHubCommit, GitHubRepo, MAX_PER_PAGE,
};

/// Default request timeout for GitHub calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one GitHub organization.
#[derive(Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://api.github.com` or a GHES `/api/v3` root.
    pub api_url: String,
    pub token: String,
    pub organization: String,
    /// Page size, capped at 100.
    pub per_page: u32,
    /// Request pacing; `None` uses the GitHub default.
    pub requests_per_second: Option<u32>,
    pub timeout: Duration,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            token: token.into(),
            organization: organization.into(),
            per_page: MAX_PER_PAGE,
            requests_per_second: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("organization", &self.organization)
            .field("per_page", &self.per_page)
            .field("requests_per_second", &self.requests_per_second)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Connector for a GitHub organization.
///
/// Commits are listed with a server-side `since` parameter; GitHub returns
/// them newest first.
#[derive(Clone)]
pub struct GitHubConnector {
    api: ApiClient,
    base: Url,
    api_url: String,
    organization: String,
    per_page: u32,
}

impl GitHubConnector {
    /// Create a connector backed by reqwest.
    #[cfg(feature = "github")]
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let transport =
            crate::http::reqwest_transport::ReqwestTransport::with_timeout(config.timeout)?;
        Self::new_with_transport(config, Arc::new(transport))
    }

    /// Create a connector over an arbitrary transport.
    pub fn new_with_transport(
        config: GitHubConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let organization = config.organization.trim().to_string();
        if organization.is_empty() {
            return Err(ConnectorError::config("GitHub organization is not set"));
        }
        if config.token.trim().is_empty() {
            return Err(ConnectorError::config("GitHub token is not set"));
        }

        let api_url = config.api_url.trim_end_matches('/').to_string();
        let base = Url::parse(&api_url).map_err(|e| {
            ConnectorError::config(format!("invalid GitHub API URL '{}': {}", api_url, e))
        })?;

        let headers = vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", config.token.trim()),
            ),
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ("User-Agent".to_string(), "tally".to_string()),
        ];
        let rps = config
            .requests_per_second
            .unwrap_or(rate_limits::GITHUB_DEFAULT_RPS);

        Ok(Self {
            api: ApiClient::new(transport, headers, Some(ApiRateLimiter::new(rps))),
            base,
            api_url,
            organization,
            per_page: config.per_page.clamp(1, MAX_PER_PAGE),
        })
    }

    fn repos_url(&self) -> String {
        format!(
            "{}/orgs/{}/repos?per_page={}&type=all",
            self.api_url, self.organization, self.per_page
        )
    }

    fn commits_url(&self, repo: &RepositoryDescriptor, since: DateTime<Utc>) -> String {
        format!(
            "{}/repos/{}/commits?since={}&per_page={}",
            self.api_url,
            repo.full_name,
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.per_page
        )
    }

    fn resolve(&self, page: PageRequest, first: impl FnOnce() -> String) -> (String, bool) {
        match page {
            PageRequest::First => (first(), true),
            PageRequest::Next(url) => (url.to_string(), false),
        }
    }
}

#[async_trait]
impl SourceConnector for GitHubConnector {
    fn source(&self) -> Source {
        Source::GitHub
    }

    fn namespace(&self) -> &str {
        &self.organization
    }

    fn commit_ordering(&self) -> CommitOrdering {
        CommitOrdering::NewestFirst
    }

    async fn list_repositories_page(
        &self,
        filter: &str,
        page: PageRequest,
    ) -> Result<Page<RepositoryDescriptor>> {
        let (url, first) = self.resolve(page, || self.repos_url());
        let resource = format!("repositories of organization {}", self.organization);

        match self.api.get_json::<Vec<GitHubRepo>>(&url, &resource).await.into_result()? {
            Some(response) => {
                let next = next_link(&self.base, &response.headers);
                let items = response
                    .body
                    .into_iter()
                    .filter(|repo| repo.name.contains(filter))
                    .map(to_repository)
                    .collect();
                Ok(Page { items, next })
            }
            None if first => Err(ConnectorError::config(format!(
                "GitHub organization '{}' not found or not visible to the token",
                self.organization
            ))),
            None => Ok(Page::empty()),
        }
    }

    async fn list_commits_page(
        &self,
        repo: &RepositoryDescriptor,
        since: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<CommitSummary>> {
        let (url, _) = self.resolve(page, || self.commits_url(repo, since));
        let resource = format!("commits of {}", repo.full_name);

        match self.api.get_json::<Vec<GitHubCommit>>(&url, &resource).await.into_result()? {
            Some(response) => {
                let next = next_link(&self.base, &response.headers);
                let now = Utc::now();
                let items = response
                    .body
                    .into_iter()
                    .map(|commit| to_commit_summary(commit, now))
                    .collect();
                Ok(Page { items, next })
            }
            // 409 for an empty repository, 404 if it vanished mid-run.
            None => Ok(Page::empty()),
        }
    }

    async fn fetch_commit_detail(
        &self,
        repo: &RepositoryDescriptor,
        sha: &str,
    ) -> FetchOutcome<CommitStats> {
        let url = format!("{}/repos/{}/commits/{}", self.api_url, repo.full_name, sha);
        let resource = format!("commit {} of {}", sha, repo.full_name);

        match self.api.get_json::<GitHubCommit>(&url, &resource).await {
            // GitHub answers 422 for a sha the repository does not contain.
            FetchOutcome::Failed(err) if err.status_code() == Some(422) => FetchOutcome::Empty,
            outcome => outcome.map(|response| to_commit_stats(&response.body)),
        }
    }

    async fn fetch_repository_stats(
        &self,
        repo: &RepositoryDescriptor,
    ) -> FetchOutcome<RepositoryActivity> {
        let url = format!("{}/repos/{}/stats/contributors", self.api_url, repo.full_name);
        let resource = format!("contributor statistics of {}", repo.full_name);

        self.api
            .get_json::<Vec<ContributorActivity>>(&url, &resource)
            .await
            .map(|response| to_activity(&response.body))
    }
}
