use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use url::Url;

use crate::connector::pagination::next_page_url;
use crate::connector::{
    ApiClient, ApiRateLimiter, CommitOrdering, CommitStats, CommitSummary, ConnectorError,
    FetchOutcome, Page, PageRequest, RepositoryDescriptor, Result, SourceConnector, rate_limits,
};
use crate::entity::source::Source;
use crate::http::HttpTransport;

use super::convert::{DiffStatTotals, to_commit_summary, to_repository};
use super::types::{
    BITBUCKET_API_URL, BitbucketCommit, BitbucketRepo, DEFAULT_PAGELEN, DIFFSTAT_PAGELEN,
    DiffStatEntry, MAX_PAGELEN, Paged,
};

/// Default request timeout for Bitbucket calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one Bitbucket Cloud workspace.
#[derive(Clone)]
pub struct BitbucketConfig {
    pub api_url: String,
    pub workspace: String,
    pub username: String,
    pub app_password: String,
    pub pagelen: u32,
    /// Fetch per-commit diffstats. Without them line and file counts are stored as null.
    pub fetch_diffstat: bool,
    /// Trust the commits endpoint to return newest first and stop at the first old commit.
    pub assume_newest_first: bool,
    /// Request pacing; `None` uses the Bitbucket default.
    pub requests_per_second: Option<u32>,
    pub timeout: Duration,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            api_url: BITBUCKET_API_URL.to_string(),
            workspace: String::new(),
            username: String::new(),
            app_password: String::new(),
            pagelen: DEFAULT_PAGELEN,
            fetch_diffstat: true,
            assume_newest_first: true,
            requests_per_second: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for BitbucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitbucketConfig")
            .field("api_url", &self.api_url)
            .field("workspace", &self.workspace)
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .field("pagelen", &self.pagelen)
            .field("fetch_diffstat", &self.fetch_diffstat)
            .field("assume_newest_first", &self.assume_newest_first)
            .field("requests_per_second", &self.requests_per_second)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Connector for a Bitbucket Cloud workspace.
///
/// The commits endpoint has no `since` parameter; the window is applied
/// client-side.
#[derive(Clone)]
pub struct BitbucketConnector {
    api: ApiClient,
    base: Url,
    workspace: String,
    pagelen: u32,
    fetch_diffstat: bool,
    ordering: CommitOrdering,
}

/// Escape a filter for use inside a BBQL string literal.
fn quote_filter(filter: &str) -> String {
    filter.replace('\\', "\\\\").replace('"', "\\\"")
}

impl BitbucketConnector {
    /// Create a connector backed by reqwest.
    #[cfg(feature = "bitbucket")]
    pub fn new(config: BitbucketConfig) -> Result<Self> {
        let transport =
            crate::http::reqwest_transport::ReqwestTransport::with_timeout(config.timeout)?;
        Self::new_with_transport(config, Arc::new(transport))
    }

    /// Create a connector over an arbitrary transport.
    pub fn new_with_transport(
        config: BitbucketConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let workspace = config.workspace.trim().to_string();
        if workspace.is_empty() {
            return Err(ConnectorError::config("Bitbucket workspace is not set"));
        }
        if config.username.trim().is_empty() || config.app_password.is_empty() {
            return Err(ConnectorError::config(
                "Bitbucket username and app password must both be set",
            ));
        }

        let base = Url::parse(config.api_url.trim_end_matches('/')).map_err(|e| {
            ConnectorError::config(format!("invalid Bitbucket API URL '{}': {}", config.api_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ConnectorError::config(format!(
                "invalid Bitbucket API URL '{}'",
                config.api_url
            )));
        }

        let credentials = STANDARD.encode(format!(
            "{}:{}",
            config.username.trim(),
            config.app_password
        ));
        let headers = vec![
            ("Authorization".to_string(), format!("Basic {}", credentials)),
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), "tally".to_string()),
        ];
        let rps = config
            .requests_per_second
            .unwrap_or(rate_limits::BITBUCKET_DEFAULT_RPS);

        Ok(Self {
            api: ApiClient::new(transport, headers, Some(ApiRateLimiter::new(rps))),
            base,
            workspace,
            pagelen: config.pagelen.clamp(1, MAX_PAGELEN),
            fetch_diffstat: config.fetch_diffstat,
            ordering: if config.assume_newest_first {
                CommitOrdering::NewestFirst
            } else {
                CommitOrdering::Unspecified
            },
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn repos_url(&self, filter: &str) -> Url {
        let mut url = self.endpoint(&["repositories", &self.workspace]);
        {
            let mut query = url.query_pairs_mut();
            if !filter.is_empty() {
                query.append_pair("q", &format!("name~\"{}\"", quote_filter(filter)));
            }
            query.append_pair("pagelen", &self.pagelen.to_string());
        }
        url
    }

    fn commits_url(&self, repo: &RepositoryDescriptor) -> Url {
        let mut url = self.endpoint(&["repositories", &self.workspace, &repo.slug, "commits"]);
        url.query_pairs_mut()
            .append_pair("pagelen", &self.pagelen.to_string());
        url
    }

    fn diffstat_url(&self, repo: &RepositoryDescriptor, sha: &str) -> Url {
        let mut url = self.endpoint(&[
            "repositories",
            &self.workspace,
            &repo.slug,
            "diffstat",
            sha,
        ]);
        url.query_pairs_mut()
            .append_pair("pagelen", &DIFFSTAT_PAGELEN.to_string());
        url
    }

    fn resolve(page: PageRequest, first: impl FnOnce() -> Url) -> (Url, bool) {
        match page {
            PageRequest::First => (first(), true),
            PageRequest::Next(url) => (url, false),
        }
    }

    /// Sum every diffstat page of a commit.
    async fn diffstat(&self, repo: &RepositoryDescriptor, sha: &str) -> FetchOutcome<CommitStats> {
        let resource = format!("diffstat of {} in {}", sha, repo.full_name);
        let mut url = self.diffstat_url(repo, sha);
        let mut visited = HashSet::new();
        let mut totals = DiffStatTotals::default();
        let mut first = true;

        loop {
            visited.insert(url.to_string());
            let page = match self
                .api
                .get_json::<Paged<DiffStatEntry>>(url.as_str(), &resource)
                .await
            {
                FetchOutcome::Data(response) => response.body,
                FetchOutcome::Empty if first => return FetchOutcome::Empty,
                FetchOutcome::Empty => break,
                FetchOutcome::Retryable(err) => return FetchOutcome::Retryable(err),
                FetchOutcome::Failed(err) => return FetchOutcome::Failed(err),
            };
            first = false;
            totals.add(&page.values);

            match next_page_url(&self.base, page.next.as_deref()) {
                Some(next) if !visited.contains(next.as_str()) => url = next,
                _ => break,
            }
        }

        FetchOutcome::Data(totals.into_stats())
    }
}

#[async_trait]
impl SourceConnector for BitbucketConnector {
    fn source(&self) -> Source {
        Source::BitbucketCloud
    }

    fn namespace(&self) -> &str {
        &self.workspace
    }

    fn commit_ordering(&self) -> CommitOrdering {
        self.ordering
    }

    async fn list_repositories_page(
        &self,
        filter: &str,
        page: PageRequest,
    ) -> Result<Page<RepositoryDescriptor>> {
        let (url, first) = Self::resolve(page, || self.repos_url(filter));
        let resource = format!("repositories of workspace {}", self.workspace);

        match self
            .api
            .get_json::<Paged<BitbucketRepo>>(url.as_str(), &resource)
            .await
            .into_result()?
        {
            Some(response) => Ok(Page {
                next: next_page_url(&self.base, response.body.next.as_deref()),
                items: response.body.values.into_iter().map(to_repository).collect(),
            }),
            None if first => Err(ConnectorError::config(format!(
                "Bitbucket workspace '{}' not found or not visible to the credentials",
                self.workspace
            ))),
            None => Ok(Page::empty()),
        }
    }

    async fn list_commits_page(
        &self,
        repo: &RepositoryDescriptor,
        _since: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Page<CommitSummary>> {
        let (url, _) = Self::resolve(page, || self.commits_url(repo));
        let resource = format!("commits of {}", repo.full_name);

        match self
            .api
            .get_json::<Paged<BitbucketCommit>>(url.as_str(), &resource)
            .await
            .into_result()?
        {
            Some(response) => Ok(Page {
                next: next_page_url(&self.base, response.body.next.as_deref()),
                items: response
                    .body
                    .values
                    .into_iter()
                    .filter_map(to_commit_summary)
                    .collect(),
            }),
            None => Ok(Page::empty()),
        }
    }

    async fn fetch_commit_detail(
        &self,
        repo: &RepositoryDescriptor,
        sha: &str,
    ) -> FetchOutcome<CommitStats> {
        if !self.fetch_diffstat {
            return FetchOutcome::Data(CommitStats::unavailable());
        }
        self.diffstat(repo, sha).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::connector::pagination;
    use crate::entity::error_kind::ErrorKind;
    use crate::http::{MockTransport, header_get};

    const API: &str = "https://api.bitbucket.org/2.0";

    fn config() -> BitbucketConfig {
        BitbucketConfig {
            workspace: "acme".to_string(),
            username: "bot".to_string(),
            app_password: "secret".to_string(),
            requests_per_second: Some(1000),
            ..BitbucketConfig::default()
        }
    }

    fn connector_with(transport: &MockTransport, config: BitbucketConfig) -> BitbucketConnector {
        BitbucketConnector::new_with_transport(config, Arc::new(transport.clone()))
            .expect("valid config")
    }

    fn repo() -> RepositoryDescriptor {
        RepositoryDescriptor {
            full_name: "acme/core-api".to_string(),
            name: "core-api".to_string(),
            slug: "core-api".to_string(),
            project_key: None,
        }
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn commit_json(hash: &str, date: &str) -> serde_json::Value {
        json!({"hash": hash, "date": date, "author": {"raw": "Ada <ada@example.com>"}})
    }

    #[test]
    fn test_missing_workspace_is_config_error() {
        let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());
        let err = BitbucketConnector::new_with_transport(
            BitbucketConfig {
                workspace: "  ".to_string(),
                ..config()
            },
            transport,
        )
        .err()
        .expect("missing workspace");
        assert_eq!(err.kind(), ErrorKind::AuthOrConfig);
    }

    #[test]
    fn test_quote_filter_escapes_quotes() {
        assert_eq!(quote_filter(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[tokio::test]
    async fn test_repositories_use_server_side_query_and_follow_next() {
        let transport = MockTransport::new();
        let first = format!("{API}/repositories/acme?q=name%7E%22core%22&pagelen=50");
        let second = format!("{API}/repositories/acme?q=name%7E%22core%22&pagelen=50&page=2");

        transport.push_json(
            &first,
            200,
            &[],
            json!({
                "values": [{"slug": "core-api", "name": "core-api", "full_name": "acme/core-api"}],
                "next": second
            }),
        );
        transport.push_json(
            &second,
            200,
            &[],
            json!({
                "values": [{"slug": "core-web", "name": "core-web", "full_name": "acme/core-web",
                            "project": {"key": "WEB"}}]
            }),
        );

        let connector = connector_with(&transport, config());
        let repos: Vec<RepositoryDescriptor> = pagination::repositories(&connector, "core")
            .try_collect()
            .await
            .expect("listing succeeds");

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[1].project_key.as_deref(), Some("WEB"));
        assert_eq!(transport.requested_urls(), vec![first, second]);

        let auth = header_get(&transport.requests()[0].headers, "authorization")
            .map(str::to_string);
        assert_eq!(auth, Some(format!("Basic {}", STANDARD.encode("bot:secret"))));
    }

    #[tokio::test]
    async fn test_empty_filter_omits_query() {
        let transport = MockTransport::new();
        let url = format!("{API}/repositories/acme?pagelen=50");
        transport.push_json(&url, 200, &[], json!({"values": []}));

        let connector = connector_with(&transport, config());
        let repos: Vec<RepositoryDescriptor> = pagination::repositories(&connector, "")
            .try_collect()
            .await
            .unwrap();
        assert!(repos.is_empty());
        assert_eq!(transport.requested_urls(), vec![url]);
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_config_error() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{API}/repositories/acme?q=name%7E%22x%22&pagelen=50"),
            404,
            &[],
            json!({"type": "error"}),
        );

        let err = pagination::repositories(&connector_with(&transport, config()), "x")
            .try_collect::<Vec<_>>()
            .await
            .expect_err("unknown workspace");
        assert_eq!(err.kind(), ErrorKind::AuthOrConfig);
    }

    #[tokio::test]
    async fn test_next_on_foreign_host_stops_pagination() {
        let transport = MockTransport::new();
        let first = format!("{API}/repositories/acme?pagelen=50");
        transport.push_json(
            &first,
            200,
            &[],
            json!({
                "values": [{"slug": "a", "name": "a", "full_name": "acme/a"}],
                "next": "https://elsewhere.example.com/2.0/repositories/acme?page=2"
            }),
        );

        let repos: Vec<RepositoryDescriptor> =
            pagination::repositories(&connector_with(&transport, config()), "")
                .try_collect()
                .await
                .unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(transport.requested_urls(), vec![first]);
    }

    #[tokio::test]
    async fn test_commits_newest_first_stop_early() {
        let transport = MockTransport::new();
        let first = format!("{API}/repositories/acme/core-api/commits?pagelen=50");
        let second = format!("{API}/repositories/acme/core-api/commits?pagelen=50&page=2");
        transport.push_json(
            &first,
            200,
            &[],
            json!({
                "values": [
                    commit_json("c2", "2024-02-01T00:00:00+00:00"),
                    {"hash": "nodate", "author": {"raw": "X <x@y>"}},
                    commit_json("old", "2023-06-01T00:00:00+00:00")
                ],
                "next": second
            }),
        );

        let connector = connector_with(&transport, config());
        let core = repo();
        let shas: Vec<String> = pagination::commits_since(&connector, &core, since())
            .map_ok(|c| c.sha)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(shas, vec!["c2"]);
        assert_eq!(transport.requested_urls(), vec![first]);
    }

    #[tokio::test]
    async fn test_commits_unordered_read_every_page() {
        let transport = MockTransport::new();
        let first = format!("{API}/repositories/acme/core-api/commits?pagelen=50");
        let second = format!("{API}/repositories/acme/core-api/commits?pagelen=50&page=2");
        transport.push_json(
            &first,
            200,
            &[],
            json!({
                "values": [
                    commit_json("old", "2023-06-01T00:00:00+00:00"),
                    commit_json("c1", "2024-01-05T00:00:00+00:00")
                ],
                "next": second
            }),
        );
        transport.push_json(
            &second,
            200,
            &[],
            json!({"values": [commit_json("c3", "2024-03-01T00:00:00+00:00")]}),
        );

        let connector = connector_with(
            &transport,
            BitbucketConfig {
                assume_newest_first: false,
                ..config()
            },
        );
        assert_eq!(connector.commit_ordering(), CommitOrdering::Unspecified);

        let core = repo();
        let shas: Vec<String> = pagination::commits_since(&connector, &core, since())
            .map_ok(|c| c.sha)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(shas, vec!["c1", "c3"]);
        assert_eq!(transport.requested_urls(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_diffstat_sums_all_pages() {
        let transport = MockTransport::new();
        let first = format!("{API}/repositories/acme/core-api/diffstat/abc?pagelen=500");
        let second = format!("{API}/repositories/acme/core-api/diffstat/abc?pagelen=500&page=2");
        transport.push_json(
            &first,
            200,
            &[],
            json!({
                "values": [
                    {"lines_added": 10, "lines_removed": 2},
                    {"lines_added": 1, "lines_removed": 0}
                ],
                "next": second
            }),
        );
        transport.push_json(
            &second,
            200,
            &[],
            json!({"values": [{"lines_added": 0, "lines_removed": 5}]}),
        );

        let connector = connector_with(&transport, config());
        match connector.fetch_commit_detail(&repo(), "abc").await {
            FetchOutcome::Data(stats) => assert_eq!(stats, CommitStats::new(11, 7, 3)),
            other => panic!("expected stats, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_detail_without_diffstat_makes_no_request() {
        let transport = MockTransport::new();
        let connector = connector_with(
            &transport,
            BitbucketConfig {
                fetch_diffstat: false,
                ..config()
            },
        );

        match connector.fetch_commit_detail(&repo(), "abc").await {
            FetchOutcome::Data(stats) => assert_eq!(stats, CommitStats::unavailable()),
            other => panic!("expected unavailable stats, got {other:?}"),
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_throttled_diffstat_is_rate_limit() {
        let transport = MockTransport::new();
        transport.push_json(
            format!("{API}/repositories/acme/core-api/diffstat/abc?pagelen=500"),
            429,
            &[("Retry-After", "30")],
            json!({"type": "error"}),
        );

        let connector = connector_with(&transport, config());
        match connector.fetch_commit_detail(&repo(), "abc").await {
            FetchOutcome::Failed(err) => assert!(err.is_rate_limited()),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repository_stats_are_unavailable() {
        let transport = MockTransport::new();
        let connector = connector_with(&transport, config());
        assert!(matches!(
            connector.fetch_repository_stats(&repo()).await,
            FetchOutcome::Empty
        ));
    }
}
