//! CommitRecord entity - one row per (source, repository, sha).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::source::Source;

/// A normalized commit ingested from a provider.
///
/// Rows are written once and never updated. The unique index on
/// `(source, repository_full_name, sha)` makes repeated inserts no-ops.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commit_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    // ─── Identity ────────────────────────────────────────────────────────────
    pub source: Source,
    /// `owner/name` for GitHub, `workspace/slug` for Bitbucket.
    pub repository_full_name: String,
    pub sha: String,

    // ─── Authorship ──────────────────────────────────────────────────────────
    pub author_name: String,
    pub author_email: Option<String>,
    pub committed_at: DateTimeWithTimeZone,

    // ─── Statistics ──────────────────────────────────────────────────────────
    /// Null when the provider cannot report it cheaply.
    pub lines_added: Option<i32>,
    pub lines_removed: Option<i32>,
    pub files_changed: Option<i32>,

    pub fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
