//! ErrorRecord entity - append-only failure trail.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::error_kind::ErrorKind;
use crate::entity::source::Source;

/// Maximum stored message length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum stored context length, in characters.
pub const MAX_CONTEXT_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "error_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub occurred_at: DateTimeWithTimeZone,

    // ─── Where ───────────────────────────────────────────────────────────────
    pub source: Option<Source>,
    pub filter_criteria: Option<String>,
    /// Pipeline location, e.g. `Organization: acme, Repo: api, Action: List Commits`.
    #[sea_orm(column_type = "Text")]
    pub context: String,

    // ─── What ────────────────────────────────────────────────────────────────
    pub kind: ErrorKind,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub status_code: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
