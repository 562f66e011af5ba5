//! Dedup index over commit records.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::connector::{CommitStats, CommitSummary};
use crate::entity::commit_record::{ActiveModel, Column, Entity as CommitRecord};
use crate::entity::source::Source;

use super::errors::Result;

/// A commit ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub source: Source,
    pub repository_full_name: String,
    pub sha: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub committed_at: DateTime<Utc>,
    pub stats: CommitStats,
}

impl NewCommit {
    pub fn new(
        source: Source,
        repository_full_name: impl Into<String>,
        summary: CommitSummary,
        stats: CommitStats,
    ) -> Self {
        Self {
            source,
            repository_full_name: repository_full_name.into(),
            sha: summary.sha,
            author_name: summary.author_name,
            author_email: summary.author_email,
            committed_at: summary.committed_at,
            stats,
        }
    }

    fn into_active_model(self, fetched_at: DateTime<Utc>) -> ActiveModel {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            source: Set(self.source),
            repository_full_name: Set(self.repository_full_name),
            sha: Set(self.sha),
            author_name: Set(self.author_name),
            author_email: Set(self.author_email),
            committed_at: Set(self.committed_at.fixed_offset()),
            lines_added: Set(self.stats.lines_added.map(clamp_i32)),
            lines_removed: Set(self.stats.lines_removed.map(clamp_i32)),
            files_changed: Set(self.stats.files_changed.map(clamp_i32)),
            fetched_at: Set(fetched_at.fixed_offset()),
        }
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Whether `(source, repository, sha)` has already been stored.
pub async fn exists<C: ConnectionTrait>(
    db: &C,
    source: Source,
    repository_full_name: &str,
    sha: &str,
) -> Result<bool> {
    let count = CommitRecord::find()
        .filter(Column::Source.eq(source))
        .filter(Column::RepositoryFullName.eq(repository_full_name))
        .filter(Column::Sha.eq(sha))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub(crate) fn insert_on_conflict() -> OnConflict {
    OnConflict::columns([Column::Source, Column::RepositoryFullName, Column::Sha])
        .do_nothing()
        .to_owned()
}

/// Insert a commit unless its key already exists.
///
/// Returns `true` if a row was written. A conflicting insert is a no-op and
/// returns `false`, so two writers racing on the same key never duplicate it.
pub async fn save<C: ConnectionTrait>(db: &C, commit: NewCommit) -> Result<bool> {
    let rows = CommitRecord::insert(commit.into_active_model(Utc::now()))
        .on_conflict(insert_on_conflict())
        .exec_without_returning(db)
        .await?;
    Ok(rows > 0)
}

/// Number of stored commits for a source.
pub async fn count_by_source<C: ConnectionTrait>(db: &C, source: Source) -> Result<u64> {
    Ok(CommitRecord::find()
        .filter(Column::Source.eq(source))
        .count(db)
        .await?)
}
