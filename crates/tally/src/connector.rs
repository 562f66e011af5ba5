//! Provider-agnostic connector interface.
//!
//! A [`SourceConnector`] turns a filter string and a `since` timestamp into
//! pages of repositories and commits for one provider. The orchestrator only
//! ever sees this trait, the [`FetchOutcome`] result type and the lazy
//! sequences in [`pagination`].
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use tally::connector::pagination;
//!
//! let mut repos = pagination::repositories(connector.as_ref(), "core");
//! while let Some(repo) = repos.try_next().await? {
//!     println!("{}", repo.full_name);
//! }
//! ```

mod api;
mod errors;
pub mod pagination;
mod rate_limit;
mod types;

pub use api::{ApiClient, JsonResponse};
pub use errors::{ConnectorError, RateLimitInfo, Result};
pub use rate_limit::{ApiRateLimiter, default_rps_for_source, rate_limits};
pub use types::{
    CommitOrdering, CommitStats, CommitSummary, FetchOutcome, Page, PageRequest,
    RepositoryActivity, RepositoryDescriptor, SourceConnector, short_sha,
};
