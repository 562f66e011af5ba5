//! Error recorder: persists classified failures without ever failing the caller.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::connector::ConnectorError;
use crate::entity::error_kind::ErrorKind;
use crate::entity::error_record::{
    ActiveModel, Column, Entity as ErrorRecord, MAX_CONTEXT_CHARS, MAX_MESSAGE_CHARS, Model,
};
use crate::entity::source::Source;

use super::errors::Result;

/// A classified failure about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }
}

impl From<&ConnectorError> for Failure {
    fn from(err: &ConnectorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            status_code: err.status_code(),
        }
    }
}

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    pub source: Option<Source>,
    pub filter: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn filter(source: Source, filter: &'a str) -> Self {
        Self {
            source: Some(source),
            filter: Some(filter),
        }
    }
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn normalize_message(failure: &Failure) -> String {
    let message = failure.message.trim();
    if message.is_empty() {
        format!("{} (no message)", failure.kind)
    } else {
        truncate(message, MAX_MESSAGE_CHARS)
    }
}

/// Appends error records.
///
/// Recording never returns an error. A record that cannot be persisted is
/// logged with `tracing::error!` instead.
#[derive(Debug, Clone)]
pub struct ErrorRecorder {
    db: Arc<DatabaseConnection>,
}

impl ErrorRecorder {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn active_model(scope: Scope<'_>, context: &str, failure: &Failure) -> ActiveModel {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            occurred_at: Set(Utc::now().fixed_offset()),
            source: Set(scope.source),
            filter_criteria: Set(scope.filter.map(str::to_string)),
            context: Set(truncate(context, MAX_CONTEXT_CHARS)),
            kind: Set(failure.kind),
            message: Set(normalize_message(failure)),
            status_code: Set(failure.status_code.map(i32::from)),
        }
    }

    /// Persist a failure. Returns the record id, or `None` if it could not be stored.
    pub async fn record(
        &self,
        scope: Scope<'_>,
        context: &str,
        failure: impl Into<Failure>,
    ) -> Option<Uuid> {
        let failure = failure.into();
        let model = Self::active_model(scope, context, &failure);

        match model.insert(self.db.as_ref()).await {
            Ok(row) => Some(row.id),
            Err(e) => {
                tracing::error!(
                    source = ?scope.source,
                    filter = ?scope.filter,
                    context,
                    kind = %failure.kind,
                    message = %failure.message,
                    error = %e,
                    "Failed to persist error record"
                );
                None
            }
        }
    }

    /// Persist a connector failure.
    pub async fn record_error(
        &self,
        scope: Scope<'_>,
        context: &str,
        err: &ConnectorError,
    ) -> Option<Uuid> {
        self.record(scope, context, err).await
    }
}

/// Most recent error records, newest first.
pub async fn recent(
    db: &DatabaseConnection,
    limit: u64,
    source: Option<Source>,
) -> Result<Vec<Model>> {
    let mut query = ErrorRecord::find();
    if let Some(source) = source {
        query = query.filter(Column::Source.eq(source));
    }
    Ok(query
        .order_by_desc(Column::OccurredAt)
        .limit(limit)
        .all(db)
        .await?)
}

/// Error records of one kind, oldest first.
pub async fn by_kind(db: &DatabaseConnection, kind: ErrorKind) -> Result<Vec<Model>> {
    Ok(ErrorRecord::find()
        .filter(Column::Kind.eq(kind))
        .order_by_asc(Column::OccurredAt)
        .all(db)
        .await?)
}
