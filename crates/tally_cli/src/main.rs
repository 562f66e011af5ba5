//! Tally CLI - command-line interface for commit-history ingestion.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::shared::OutputFormat;

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Incremental commit-history ingestion from hosted git providers")]
#[command(
    long_about = "Tally pulls commit metadata from GitHub organizations and Bitbucket \
workspaces into a local database. Each filter (a repository name substring) keeps a \
watermark, so every run only asks for commits newer than the last completed run."
)]
#[command(after_long_help = r#"EXAMPLES
    Create the schema:
        $ tally migrate up

    Track every repository whose name contains "core":
        $ tally filters add github core

    Run all enabled sources once:
        $ tally run

    Run weekly until Ctrl+C:
        $ tally schedule

CONFIGURATION
    Tally reads configuration from:
      1. ~/.config/tally/config.toml (or $XDG_CONFIG_HOME/tally/config.toml)
      2. ./tally.toml
      3. Environment variables (TALLY_* prefix, `__` between sections)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    TALLY_DATABASE__URL              Database connection string (default: ~/.local/state/tally/tally.db)
    TALLY_GITHUB__ENABLED            Enable the GitHub source
    TALLY_GITHUB__ORGANIZATION       GitHub organization
    TALLY_GITHUB__TOKEN              GitHub token
    TALLY_BITBUCKET__ENABLED         Enable the Bitbucket source
    TALLY_BITBUCKET__WORKSPACE       Bitbucket workspace
    TALLY_BITBUCKET__USERNAME        Bitbucket username
    TALLY_BITBUCKET__APP_PASSWORD    Bitbucket app password
    RUST_LOG                         Log filter (default: tally=info,tally_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Ingest new commits now and print a summary
    Run {
        /// Only run this source (github, bitbucket)
        #[arg(short, long)]
        source: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Manage filters
    Filters {
        #[command(subcommand)]
        action: FiltersAction,
    },
    /// Show recent error records
    Errors {
        /// Maximum number of records
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u64,

        /// Only show errors of this source
        #[arg(short, long)]
        source: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Trigger all sources on a fixed interval until Ctrl+C
    Schedule {
        /// Hours between runs (default from config or 168)
        #[arg(short, long)]
        interval_hours: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// List tally migrations and whether each is applied
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Drop every tally table and reapply all migrations
    Fresh,
}

#[derive(Subcommand)]
enum FiltersAction {
    /// List filters and their watermarks
    List {
        /// Only list filters of this source
        #[arg(short, long)]
        source: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Add a filter for a source
    Add {
        /// Source name (github, bitbucket)
        source: String,
        /// Repository name substring
        filter: String,
    },
}

/// Create the parent directory of a SQLite database file.
fn prepare_sqlite_path(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = std::path::Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("tally=info,tally_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // config file -> env vars -> defaults
    let config = config::Config::load();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set [database] url or TALLY_DATABASE__URL")?;
    prepare_sqlite_path(&database_url)?;

    if let Commands::Migrate { action } = cli.command {
        return commands::migrate::handle_migrate(action, &database_url).await;
    }

    let db = Arc::new(tally::connect_and_migrate(&database_url).await?);
    let shutdown = shutdown::setup_shutdown_handler();

    match cli.command {
        Commands::Run { source, output } => {
            commands::run::handle_run(source, output, &config, &db, &shutdown).await?;
        }
        Commands::Filters { action } => match action {
            FiltersAction::List { source, output } => {
                commands::filters::handle_list(source, output, &db).await?;
            }
            FiltersAction::Add { source, filter } => {
                commands::filters::handle_add(&source, &filter, &db).await?;
            }
        },
        Commands::Errors {
            limit,
            source,
            output,
        } => {
            commands::errors::handle_errors(limit, source, output, &db).await?;
        }
        Commands::Schedule { interval_hours } => {
            commands::schedule::handle_schedule(interval_hours, &config, &db, &shutdown).await?;
        }
        Commands::Migrate { .. } | Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_source() {
        let cli = Cli::try_parse_from(["tally", "run", "--source", "github"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run { source: Some(ref s), .. } if s == "github"
        ));
    }

    #[test]
    fn test_parse_filters_add() {
        let cli = Cli::try_parse_from(["tally", "filters", "add", "bitbucket", "core"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Filters {
                action: FiltersAction::Add { ref source, ref filter }
            } if source == "bitbucket" && filter == "core"
        ));
    }

    #[test]
    fn test_parse_errors_defaults() {
        let cli = Cli::try_parse_from(["tally", "errors"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Errors { limit: 20, source: None, .. }
        ));
    }

    #[test]
    fn test_parse_migrate_status_output() {
        let cli = Cli::try_parse_from(["tally", "migrate", "status", "--output", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                action: MigrateAction::Status {
                    output: OutputFormat::Json
                }
            }
        ));
    }

    #[test]
    fn test_prepare_sqlite_path_ignores_other_schemes() {
        prepare_sqlite_path("postgres://localhost/tally").unwrap();
        prepare_sqlite_path("sqlite::memory:").unwrap();
    }
}
