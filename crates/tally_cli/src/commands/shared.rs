use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use clap::ValueEnum;
use sea_orm::DatabaseConnection;

use tally::ingest::Orchestrator;
use tally::store::{ErrorRecorder, Scope};
use tally::{ConnectorError, Source, SourceConnector};

use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::Shutdown;

/// Output format for tables.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

impl OutputFormat {
    pub(crate) fn print<T>(self, rows: Vec<T>) -> Result<(), Box<dyn std::error::Error>>
    where
        T: tabled::Tabled + serde::Serialize,
    {
        match self {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(rows);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        }
        Ok(())
    }
}

/// Parse a `--source` value.
pub(crate) fn parse_source(name: &str) -> Result<Source, Box<dyn std::error::Error>> {
    Ok(name.parse::<Source>()?)
}

pub(crate) fn format_time(at: Option<DateTime<FixedOffset>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M:%S %:z").to_string())
        .unwrap_or_else(|| "never".to_string())
}

#[cfg(feature = "github")]
fn github_connector(config: &Config) -> Result<Arc<dyn SourceConnector>, ConnectorError> {
    use tally::github::{GitHubConfig, GitHubConnector};

    let section = &config.github;
    let mut github = GitHubConfig::new(
        section.token.clone().unwrap_or_default(),
        section.organization.clone().unwrap_or_default(),
    );
    if let Some(api_url) = &section.api_url {
        github.api_url = api_url.clone();
    }
    github.requests_per_second = section.requests_per_second;
    Ok(Arc::new(GitHubConnector::new(github)?))
}

#[cfg(feature = "bitbucket")]
fn bitbucket_connector(config: &Config) -> Result<Arc<dyn SourceConnector>, ConnectorError> {
    use tally::bitbucket::{BitbucketConfig, BitbucketConnector};

    let section = &config.bitbucket;
    let mut bitbucket = BitbucketConfig {
        workspace: section.workspace.clone().unwrap_or_default(),
        username: section.username.clone().unwrap_or_default(),
        app_password: section.app_password.clone().unwrap_or_default(),
        fetch_diffstat: section.fetch_diffstat,
        assume_newest_first: section.assume_newest_first,
        requests_per_second: section.requests_per_second,
        ..BitbucketConfig::default()
    };
    if let Some(api_url) = &section.api_url {
        bitbucket.api_url = api_url.clone();
    }
    Ok(Arc::new(BitbucketConnector::new(bitbucket)?))
}

fn build_connector(
    source: Source,
    config: &Config,
) -> Option<Result<Arc<dyn SourceConnector>, ConnectorError>> {
    match source {
        #[cfg(feature = "github")]
        Source::GitHub if config.github.enabled => Some(github_connector(config)),
        #[cfg(feature = "bitbucket")]
        Source::BitbucketCloud if config.bitbucket.enabled => Some(bitbucket_connector(config)),
        _ => None,
    }
}

/// Connectors for every enabled source.
///
/// A source that is enabled but misconfigured is left out; the failure is
/// recorded as an error record so it shows up in `tally errors`.
pub(crate) async fn build_connectors(
    config: &Config,
    db: &Arc<DatabaseConnection>,
) -> Vec<Arc<dyn SourceConnector>> {
    let recorder = ErrorRecorder::new(Arc::clone(db));
    let mut connectors = Vec::new();

    for source in Source::all() {
        match build_connector(source, config) {
            Some(Ok(connector)) => connectors.push(connector),
            Some(Err(e)) => {
                tracing::error!(source = %source, error = %e, "Source is enabled but cannot run");
                recorder
                    .record_error(
                        Scope {
                            source: Some(source),
                            filter: None,
                        },
                        &format!("Configuration: source '{}'", source.display_name()),
                        &e,
                    )
                    .await;
            }
            None => tracing::debug!(source = %source, "Source not enabled"),
        }
    }

    connectors
}

/// Orchestrator over the enabled sources, reporting progress and honouring Ctrl+C.
pub(crate) async fn build_orchestrator(
    config: &Config,
    db: &Arc<DatabaseConnection>,
    shutdown: &Shutdown,
) -> Orchestrator {
    let connectors = build_connectors(config, db).await;
    let reporter = Arc::new(ProgressReporter::new());

    Orchestrator::new(Arc::clone(db), connectors, config.ingest.options())
        .with_progress(reporter.into_callback())
        .with_shutdown(shutdown.flag())
}
