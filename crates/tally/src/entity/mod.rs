//! SeaORM entity definitions for the tally database schema.

pub mod commit_record;
pub mod error_kind;
pub mod error_record;
pub mod filter_watermark;
pub mod prelude;
pub mod repository_stats;
pub mod source;
