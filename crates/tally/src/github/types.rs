//! GitHub REST payloads, reduced to the fields ingestion reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::IgnoredAny;

/// Default public API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Largest page size the REST API accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Pinned REST API version.
pub const API_VERSION: &str = "2022-11-28";

/// Entry of `GET /orgs/{org}/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    pub full_name: String,
}

/// Entry of `GET /repos/{owner}/{repo}/commits`, and the body of the
/// single-commit endpoint (which adds `stats` and `files`).
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitCommit,
    /// The linked GitHub account, absent for unknown emails.
    #[serde(default)]
    pub author: Option<GitHubAccount>,
    #[serde(default)]
    pub stats: Option<GitHubCommitStats>,
    /// Only the count is read.
    #[serde(default)]
    pub files: Option<Vec<IgnoredAny>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitCommit {
    #[serde(default)]
    pub author: Option<GitSignature>,
    #[serde(default)]
    pub committer: Option<GitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitSignature {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAccount {
    pub login: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GitHubCommitStats {
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
}

/// Entry of `GET /repos/{owner}/{repo}/stats/contributors`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorActivity {
    pub total: u64,
}
