use sea_orm::DatabaseConnection;
use serde::Serialize;
use tabled::Tabled;

use tally::ErrorRecordModel;
use tally::store::recorder;

use super::shared::{OutputFormat, format_time, parse_source};

#[derive(Debug, Serialize, Tabled)]
struct ErrorRow {
    #[tabled(rename = "When")]
    occurred_at: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<ErrorRecordModel> for ErrorRow {
    fn from(row: ErrorRecordModel) -> Self {
        Self {
            occurred_at: format_time(Some(row.occurred_at)),
            source: row.source.map(|s| s.to_string()).unwrap_or_default(),
            filter: row.filter_criteria.unwrap_or_default(),
            kind: row.kind.to_string(),
            status: row.status_code.map(|s| s.to_string()).unwrap_or_default(),
            context: row.context,
            message: row.message,
        }
    }
}

/// Show the most recent error records, newest first.
pub(crate) async fn handle_errors(
    limit: u64,
    source: Option<String>,
    output: OutputFormat,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = source.as_deref().map(parse_source).transpose()?;
    let rows = recorder::recent(db, limit, source).await?;

    if rows.is_empty() {
        println!("No errors recorded.");
        return Ok(());
    }
    output.print(rows.into_iter().map(ErrorRow::from).collect())
}
