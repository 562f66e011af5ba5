//! GitHub organization connector.
//!
//! # Module Structure
//!
//! - [`types`] - REST payloads
//! - [`client`] - [`GitHubConnector`] and its configuration
//! - [`pagination`] - `Link` header handling
//! - [`convert`] - Payload conversion to connector types

mod client;
mod convert;
mod pagination;
mod types;

pub use client::{DEFAULT_TIMEOUT, GitHubConfig, GitHubConnector};
pub use convert::UNKNOWN_AUTHOR;
pub use pagination::{LinkRelations, parse_link_header};
pub use types::{GITHUB_API_URL, MAX_PER_PAGE};
