use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tabled::Tabled;

use tally::ingest::{FilterOutcome, FilterReport, SourceReport, SourceStatus};

use super::shared::{OutputFormat, build_orchestrator, parse_source};
use crate::config::Config;
use crate::shutdown::Shutdown;

/// One row of the run summary.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct FilterRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Filter")]
    filter: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Repos")]
    repositories: usize,
    #[tabled(rename = "Saved")]
    saved: usize,
    #[tabled(rename = "Present")]
    already_present: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
}

impl FilterRow {
    fn from_report(source: &SourceReport, report: &FilterReport) -> Self {
        let stats = report.stats();
        let status = match &report.outcome {
            FilterOutcome::Completed(_) => "completed".to_string(),
            FilterOutcome::Aborted { kind, .. } => format!("aborted ({})", kind),
        };
        Self {
            source: source.source.to_string(),
            filter: report.filter.clone(),
            since: report.since.format("%Y-%m-%d %H:%M").to_string(),
            status,
            repositories: stats.repositories_seen,
            saved: stats.commits_saved,
            already_present: stats.commits_already_present,
            skipped: stats.commits_skipped,
        }
    }

    fn placeholder(source: &SourceReport, filter: &str, status: &str) -> Self {
        Self {
            source: source.source.to_string(),
            filter: filter.to_string(),
            since: "-".to_string(),
            status: status.to_string(),
            repositories: 0,
            saved: 0,
            already_present: 0,
            skipped: 0,
        }
    }
}

pub(crate) fn summary_rows(reports: &[SourceReport]) -> Vec<FilterRow> {
    let mut rows = Vec::new();
    for source in reports {
        match &source.status {
            SourceStatus::NoFilters => rows.push(FilterRow::placeholder(source, "-", "no filters")),
            SourceStatus::AlreadyRunning => {
                rows.push(FilterRow::placeholder(source, "-", "already running"))
            }
            SourceStatus::Failed(message) => {
                rows.push(FilterRow::placeholder(source, "-", &format!("failed: {}", message)))
            }
            SourceStatus::Finished | SourceStatus::Interrupted => {}
        }
        rows.extend(
            source
                .filters
                .iter()
                .map(|report| FilterRow::from_report(source, report)),
        );
        rows.extend(
            source
                .not_started
                .iter()
                .map(|filter| FilterRow::placeholder(source, filter, "not started")),
        );
    }
    rows
}

/// Run ingestion in the foreground and print a per-filter summary.
///
/// Fails with a non-zero exit when any filter aborted, so schedulers notice.
pub(crate) async fn handle_run(
    source: Option<String>,
    output: OutputFormat,
    config: &Config,
    db: &Arc<DatabaseConnection>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = build_orchestrator(config, db, shutdown).await;
    if orchestrator.enabled_sources().is_empty() {
        return Err("No sources are enabled. Set [github] or [bitbucket] enabled = true.".into());
    }

    let reports = match source {
        Some(name) => vec![orchestrator.run_source(parse_source(&name)?).await?],
        None => orchestrator.run_all().await,
    };

    output.print(summary_rows(&reports))?;

    let aborted: usize = reports
        .iter()
        .map(|r| r.filters.iter().filter(|f| !f.is_completed()).count())
        .sum();
    if aborted > 0 {
        return Err(format!(
            "{} filter(s) aborted; see `tally errors` for details",
            aborted
        )
        .into());
    }
    Ok(())
}
