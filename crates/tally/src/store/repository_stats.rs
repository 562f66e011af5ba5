//! Repository activity aggregates.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::connector::RepositoryActivity;
use crate::entity::repository_stats::{ActiveModel, Column, Entity as RepositoryStats, Model};
use crate::entity::source::Source;

use super::errors::Result;

/// Insert or refresh the aggregates for a repository.
pub async fn upsert<C: ConnectionTrait>(
    db: &C,
    source: Source,
    repository_full_name: &str,
    activity: RepositoryActivity,
) -> Result<()> {
    let model = ActiveModel {
        id: Set(Uuid::new_v4()),
        source: Set(source),
        repository_full_name: Set(repository_full_name.to_string()),
        total_commits: Set(i64::try_from(activity.total_commits).unwrap_or(i64::MAX)),
        contributor_count: Set(i32::try_from(activity.contributor_count).unwrap_or(i32::MAX)),
        updated_at: Set(Utc::now().fixed_offset()),
    };

    RepositoryStats::insert(model)
        .on_conflict(
            OnConflict::columns([Column::Source, Column::RepositoryFullName])
                .update_columns([
                    Column::TotalCommits,
                    Column::ContributorCount,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn find<C: ConnectionTrait>(
    db: &C,
    source: Source,
    repository_full_name: &str,
) -> Result<Option<Model>> {
    Ok(RepositoryStats::find()
        .filter(Column::Source.eq(source))
        .filter(Column::RepositoryFullName.eq(repository_full_name))
        .one(db)
        .await?)
}
