//! Bitbucket Cloud 2.0 payloads, reduced to the fields ingestion reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Default Bitbucket Cloud API root.
pub const BITBUCKET_API_URL: &str = "https://api.bitbucket.org/2.0";

/// Page size used for repository and commit listings.
pub const DEFAULT_PAGELEN: u32 = 50;

/// Largest `pagelen` Bitbucket accepts on listings.
pub const MAX_PAGELEN: u32 = 100;

/// Page size for diffstat walks.
pub const DIFFSTAT_PAGELEN: u32 = 500;

/// Envelope of every paginated Bitbucket response.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    /// Absolute URL of the next page.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketRepo {
    pub slug: String,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub project: Option<BitbucketProject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketProject {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketCommit {
    pub hash: String,
    #[serde(default)]
    pub author: Option<BitbucketAuthor>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Commit author: the raw `Name <email>` string plus the linked account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitbucketAuthor {
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub user: Option<BitbucketUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitbucketUser {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One file entry of `GET .../diffstat/{sha}`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DiffStatEntry {
    #[serde(default)]
    pub lines_added: u32,
    #[serde(default)]
    pub lines_removed: u32,
}
