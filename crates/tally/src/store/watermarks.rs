//! Watermark store: per (source, filter) progress, and the filter registry.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::filter_watermark::{ActiveModel, Column, Entity as FilterWatermark, Model};
use crate::entity::source::Source;

use super::errors::Result;

fn new_row(source: Source, filter: &str, last_fetch_at: Option<DateTime<Utc>>) -> ActiveModel {
    ActiveModel {
        id: Set(Uuid::new_v4()),
        source: Set(source),
        filter_criteria: Set(filter.to_string()),
        last_fetch_at: Set(last_fetch_at.map(|at| at.fixed_offset())),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

fn key_conflict() -> OnConflict {
    OnConflict::columns([Column::Source, Column::FilterCriteria])
}

/// Find the watermark row for a filter.
pub async fn find<C: ConnectionTrait>(
    db: &C,
    source: Source,
    filter: &str,
) -> Result<Option<Model>> {
    Ok(FilterWatermark::find()
        .filter(Column::Source.eq(source))
        .filter(Column::FilterCriteria.eq(filter))
        .one(db)
        .await?)
}

/// Last successful fetch time, or `None` if the filter never completed a run.
pub async fn get<C: ConnectionTrait>(
    db: &C,
    source: Source,
    filter: &str,
) -> Result<Option<DateTime<Utc>>> {
    Ok(find(db, source, filter)
        .await?
        .and_then(|row| row.last_fetch_at)
        .map(|at| at.with_timezone(&Utc)))
}

/// Set a filter's watermark. Last write wins; a missing row is created.
pub async fn set<C: ConnectionTrait>(
    db: &C,
    source: Source,
    filter: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    FilterWatermark::insert(new_row(source, filter, Some(at)))
        .on_conflict(key_conflict().update_column(Column::LastFetchAt).to_owned())
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Configure a filter for a source. Returns `false` if it already existed.
pub async fn register<C: ConnectionTrait>(db: &C, source: Source, filter: &str) -> Result<bool> {
    let rows = FilterWatermark::insert(new_row(source, filter, None))
        .on_conflict(key_conflict().do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;
    Ok(rows > 0)
}

/// Filters configured for a source, in insertion order.
pub async fn list<C: ConnectionTrait>(db: &C, source: Source) -> Result<Vec<Model>> {
    Ok(FilterWatermark::find()
        .filter(Column::Source.eq(source))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::FilterCriteria)
        .all(db)
        .await?)
}

/// Every configured filter across sources.
pub async fn list_all<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>> {
    Ok(FilterWatermark::find()
        .order_by_asc(Column::Source)
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::FilterCriteria)
        .all(db)
        .await?)
}
