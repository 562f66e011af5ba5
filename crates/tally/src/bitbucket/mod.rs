//! Bitbucket Cloud workspace connector.
//!
//! Repositories are searched server-side with a BBQL `name~"..."` query.
//! Commits carry no server-side window, so the connector relies on the
//! newest-first order of the commits endpoint unless told otherwise.

mod client;
mod convert;
mod types;

pub use client::{BitbucketConfig, BitbucketConnector, DEFAULT_TIMEOUT};
pub use convert::{UNKNOWN_AUTHOR, parse_author};
pub use types::{BITBUCKET_API_URL, DEFAULT_PAGELEN};
