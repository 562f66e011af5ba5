use console::style;
use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use tabled::Tabled;

use tally::db;
use tally::migration::{MigrationStatus, Migrator, MigratorTrait};

use super::shared::OutputFormat;
use crate::MigrateAction;

/// One tally schema migration and its state in the connected database.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct MigrationRow {
    #[tabled(rename = "Migration")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Every tally migration, oldest first, with its applied state.
pub(crate) async fn migration_rows(db: &DatabaseConnection) -> Result<Vec<MigrationRow>, DbErr> {
    Ok(Migrator::get_migration_with_status(db)
        .await?
        .into_iter()
        .map(|migration| MigrationRow {
            name: migration.name().to_string(),
            status: migration.status().to_string(),
        })
        .collect())
}

async fn names_with_status(
    db: &DatabaseConnection,
    status: MigrationStatus,
) -> Result<Vec<String>, DbErr> {
    Ok(Migrator::get_migration_with_status(db)
        .await?
        .into_iter()
        .filter(|migration| migration.status() == status)
        .map(|migration| migration.name().to_string())
        .collect())
}

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = names_with_status(&db, MigrationStatus::Pending).await?;
            if pending.is_empty() {
                println!("Schema is up to date.");
                return Ok(());
            }
            Migrator::up(&db, None).await?;
            for name in &pending {
                println!("{} {}", style("Applied").green(), name);
            }
        }
        MigrateAction::Down => {
            let applied = names_with_status(&db, MigrationStatus::Applied).await?;
            let Some(last) = applied.last() else {
                println!("No applied migrations to roll back.");
                return Ok(());
            };
            Migrator::down(&db, Some(1)).await?;
            println!("{} {}", style("Rolled back").yellow(), last);
        }
        MigrateAction::Status { output } => {
            output.print(migration_rows(&db).await?)?;
        }
        MigrateAction::Fresh => {
            Migrator::fresh(&db).await?;
            println!(
                "{} dropped all tables and applied {} migration(s).",
                style("Fresh").green(),
                Migrator::migrations().len()
            );
        }
    }

    Ok(())
}
