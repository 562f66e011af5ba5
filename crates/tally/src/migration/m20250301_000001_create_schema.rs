//! Initial migration: commit records, filter watermarks, error records and
//! repository stats.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_commit_records(manager).await?;
        self.create_filter_watermarks(manager).await?;
        self.create_error_records(manager).await?;
        self.create_repository_stats(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RepositoryStats::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ErrorRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FilterWatermarks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommitRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_commit_records(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CommitRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CommitRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    // Identity
                    .col(ColumnDef::new(CommitRecords::Source).string().not_null())
                    .col(
                        ColumnDef::new(CommitRecords::RepositoryFullName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CommitRecords::Sha).string().not_null())
                    // Authorship
                    .col(
                        ColumnDef::new(CommitRecords::AuthorName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CommitRecords::AuthorEmail).string().null())
                    .col(
                        ColumnDef::new(CommitRecords::CommittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    // Statistics
                    .col(ColumnDef::new(CommitRecords::LinesAdded).integer().null())
                    .col(ColumnDef::new(CommitRecords::LinesRemoved).integer().null())
                    .col(ColumnDef::new(CommitRecords::FilesChanged).integer().null())
                    .col(
                        ColumnDef::new(CommitRecords::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Dedup key
        manager
            .create_index(
                Index::create()
                    .name("idx_commit_records_source_repo_sha")
                    .table(CommitRecords::Table)
                    .col(CommitRecords::Source)
                    .col(CommitRecords::RepositoryFullName)
                    .col(CommitRecords::Sha)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_commit_records_committed_at")
                    .table(CommitRecords::Table)
                    .col(CommitRecords::CommittedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_filter_watermarks(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FilterWatermarks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FilterWatermarks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FilterWatermarks::Source)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FilterWatermarks::FilterCriteria)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FilterWatermarks::LastFetchAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FilterWatermarks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_filter_watermarks_source_filter")
                    .table(FilterWatermarks::Table)
                    .col(FilterWatermarks::Source)
                    .col(FilterWatermarks::FilterCriteria)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_error_records(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ErrorRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ErrorRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ErrorRecords::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ErrorRecords::Source).string().null())
                    .col(ColumnDef::new(ErrorRecords::FilterCriteria).string().null())
                    .col(ColumnDef::new(ErrorRecords::Context).text().not_null())
                    .col(ColumnDef::new(ErrorRecords::Kind).string().not_null())
                    .col(ColumnDef::new(ErrorRecords::Message).text().not_null())
                    .col(ColumnDef::new(ErrorRecords::StatusCode).integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_error_records_occurred_at")
                    .table(ErrorRecords::Table)
                    .col(ErrorRecords::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_repository_stats(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RepositoryStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RepositoryStats::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RepositoryStats::Source).string().not_null())
                    .col(
                        ColumnDef::new(RepositoryStats::RepositoryFullName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryStats::TotalCommits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RepositoryStats::ContributorCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RepositoryStats::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repository_stats_source_repo")
                    .table(RepositoryStats::Table)
                    .col(RepositoryStats::Source)
                    .col(RepositoryStats::RepositoryFullName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum CommitRecords {
    Table,
    Id,
    Source,
    RepositoryFullName,
    Sha,
    AuthorName,
    AuthorEmail,
    CommittedAt,
    LinesAdded,
    LinesRemoved,
    FilesChanged,
    FetchedAt,
}

#[derive(DeriveIden)]
enum FilterWatermarks {
    Table,
    Id,
    Source,
    FilterCriteria,
    LastFetchAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ErrorRecords {
    Table,
    Id,
    OccurredAt,
    Source,
    FilterCriteria,
    Context,
    Kind,
    Message,
    StatusCode,
}

#[derive(DeriveIden)]
enum RepositoryStats {
    Table,
    Id,
    Source,
    RepositoryFullName,
    TotalCommits,
    ContributorCount,
    UpdatedAt,
}
