//! Common re-exports for convenient entity usage.

pub use super::commit_record::{
    ActiveModel as CommitRecordActiveModel, Column as CommitRecordColumn,
    Entity as CommitRecord, Model as CommitRecordModel,
};
pub use super::error_kind::ErrorKind;
pub use super::error_record::{
    ActiveModel as ErrorRecordActiveModel, Column as ErrorRecordColumn, Entity as ErrorRecord,
    Model as ErrorRecordModel,
};
pub use super::filter_watermark::{
    ActiveModel as FilterWatermarkActiveModel, Column as FilterWatermarkColumn,
    Entity as FilterWatermark, Model as FilterWatermarkModel,
};
pub use super::repository_stats::{
    ActiveModel as RepositoryStatsActiveModel, Column as RepositoryStatsColumn,
    Entity as RepositoryStats, Model as RepositoryStatsModel,
};
pub use super::source::Source;
