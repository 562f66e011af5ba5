//! FilterWatermark entity - per (source, filter) progress marker.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::source::Source;

/// Tracks when a filter last completed without a run-aborting error.
///
/// The set of rows for a source is also the set of configured filters for it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "filter_watermarks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub source: Source,
    /// Repository name substring the filter matches on.
    pub filter_criteria: String,

    /// Start time of the last successful run. `None` means never run.
    pub last_fetch_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
