use sea_orm::DatabaseConnection;
use serde::Serialize;
use tabled::Tabled;

use tally::store::watermarks;
use tally::{FilterWatermarkModel, Source};

use super::shared::{OutputFormat, format_time, parse_source};

#[derive(Debug, Serialize, Tabled)]
struct FilterRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Last fetch")]
    last_fetch_at: String,
    #[tabled(rename = "Added")]
    created_at: String,
}

impl From<FilterWatermarkModel> for FilterRow {
    fn from(row: FilterWatermarkModel) -> Self {
        Self {
            source: row.source.to_string(),
            filter: row.filter_criteria,
            last_fetch_at: format_time(row.last_fetch_at),
            created_at: format_time(Some(row.created_at)),
        }
    }
}

/// List configured filters and their watermarks.
pub(crate) async fn handle_list(
    source: Option<String>,
    output: OutputFormat,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = match source {
        Some(name) => watermarks::list(db, parse_source(&name)?).await?,
        None => watermarks::list_all(db).await?,
    };

    if rows.is_empty() {
        println!("No filters configured. Add one with: tally filters add <source> <filter>");
        return Ok(());
    }
    output.print(rows.into_iter().map(FilterRow::from).collect())
}

/// Configure a new filter for a source.
pub(crate) async fn handle_add(
    source: &str,
    filter: &str,
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let source: Source = parse_source(source)?;
    let filter = filter.trim();
    if filter.is_empty() {
        return Err("Filter must not be empty".into());
    }

    if watermarks::register(db, source, filter).await? {
        println!("Added filter '{}' for {}.", filter, source.display_name());
    } else {
        println!(
            "Filter '{}' is already configured for {}.",
            filter,
            source.display_name()
        );
    }
    Ok(())
}
