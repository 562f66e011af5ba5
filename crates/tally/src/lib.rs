//! Tally - incremental commit-history ingestion.
//!
//! This library pulls commit metadata from hosted git providers into a
//! relational store. Each configured filter (a repository name substring)
//! carries a watermark; a run only asks providers for commits newer than it
//! and only moves it forward when the run completes.
//!
//! # Features
//!
//! - `github` - GitHub organization connector (reqwest transport).
//! - `bitbucket` - Bitbucket Cloud workspace connector (reqwest transport).
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to create the schema on connection.
//! - `sqlite` / `postgres` - database drivers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally::{connect_and_migrate, ingest::{IngestOptions, Orchestrator}, Source};
//! use tally::github::{GitHubConfig, GitHubConnector};
//!
//! let db = Arc::new(connect_and_migrate("sqlite://tally.db?mode=rwc").await?);
//! tally::store::watermarks::register(db.as_ref(), Source::GitHub, "core").await?;
//!
//! let github = GitHubConnector::new(GitHubConfig::new(token, "acme"))?;
//! let orchestrator = Orchestrator::new(db, vec![Arc::new(github)], IngestOptions::default());
//! let reports = orchestrator.run_all().await;
//! ```

pub mod connector;
pub mod db;
pub mod entity;
pub mod http;
pub mod ingest;
pub mod retry;
pub mod store;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "bitbucket")]
pub mod bitbucket;

#[cfg(feature = "migrate")]
pub mod migration;

pub use connector::{
    CommitOrdering, CommitStats, CommitSummary, ConnectorError, FetchOutcome, Page, PageRequest,
    RepositoryActivity, RepositoryDescriptor, SourceConnector,
};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use ingest::{
    IngestOptions, IngestService, Orchestrator, OrchestratorError, SourceReport, TriggerAck,
};
pub use store::{ErrorRecorder, StoreError};
