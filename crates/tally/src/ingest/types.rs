//! Options and report types for ingestion runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entity::error_kind::ErrorKind;
use crate::entity::source::Source;
use crate::retry::NotReadyPolicy;

/// `since` for filters that never completed a run: 2024-01-01T00:00:00Z.
pub const DEFAULT_SINCE_TIMESTAMP: i64 = 1_704_067_200;

/// The default start of tracked history.
pub fn default_since() -> DateTime<Utc> {
    DateTime::from_timestamp(DEFAULT_SINCE_TIMESTAMP, 0).unwrap_or_default()
}

/// Options for an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Window start for filters without a watermark.
    pub default_since: DateTime<Utc>,
    /// Budget for "not yet computed" responses.
    pub not_ready: NotReadyPolicy,
    /// Collect repository aggregates after each repository's commits.
    pub repository_stats: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            default_since: default_since(),
            not_ready: NotReadyPolicy::default(),
            repository_stats: true,
        }
    }
}

/// Counters for one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Repositories matched by the filter.
    pub repositories_seen: usize,
    /// Repositories abandoned after a recoverable failure.
    pub repositories_skipped: usize,
    /// In-window commits listed.
    pub commits_seen: usize,
    /// New commit records written.
    pub commits_saved: usize,
    /// Commits the dedup index already had.
    pub commits_already_present: usize,
    /// Commits abandoned after a recoverable failure.
    pub commits_skipped: usize,
    /// Repository aggregate rows written.
    pub repository_stats_updated: usize,
}

/// How a filter run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The walk finished; the watermark now equals the run's start time.
    Completed(IngestStats),
    /// A run-aborting error ended the walk; the watermark is unchanged.
    Aborted {
        kind: ErrorKind,
        message: String,
        stats: IngestStats,
    },
}

/// Result of one filter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub filter: String,
    /// Window start used for this run.
    pub since: DateTime<Utc>,
    /// Captured before any network call. Becomes the watermark on success.
    pub started_at: DateTime<Utc>,
    pub outcome: FilterOutcome,
}

impl FilterReport {
    pub fn stats(&self) -> &IngestStats {
        match &self.outcome {
            FilterOutcome::Completed(stats) | FilterOutcome::Aborted { stats, .. } => stats,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, FilterOutcome::Completed(_))
    }
}

/// How a source run ended as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Every configured filter was attempted.
    Finished,
    /// No filters are configured for the source.
    NoFilters,
    /// Shutdown was requested before every filter ran.
    Interrupted,
    /// Another run for the source was in progress; this one did nothing.
    AlreadyRunning,
    /// The run could not start, e.g. filters could not be loaded.
    Failed(String),
}

/// Result of one source run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
    pub filters: Vec<FilterReport>,
    /// Filters not started because of shutdown.
    pub not_started: Vec<String>,
}

impl SourceReport {
    pub fn new(source: Source, status: SourceStatus) -> Self {
        Self {
            source,
            status,
            filters: Vec::new(),
            not_started: Vec::new(),
        }
    }

    /// Totals across the filters that ran.
    pub fn totals(&self) -> IngestStats {
        self.filters.iter().fold(IngestStats::default(), |mut acc, report| {
            let stats = report.stats();
            acc.repositories_seen += stats.repositories_seen;
            acc.repositories_skipped += stats.repositories_skipped;
            acc.commits_seen += stats.commits_seen;
            acc.commits_saved += stats.commits_saved;
            acc.commits_already_present += stats.commits_already_present;
            acc.commits_skipped += stats.commits_skipped;
            acc.repository_stats_updated += stats.repository_stats_updated;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_since_is_start_of_2024() {
        assert_eq!(default_since().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_default_options() {
        let options = IngestOptions::default();
        assert!(options.repository_stats);
        assert_eq!(options.not_ready.max_attempts, 4);
    }

    #[test]
    fn test_totals_sum_completed_and_aborted() {
        let mut report = SourceReport::new(Source::GitHub, SourceStatus::Finished);
        let stats = IngestStats {
            repositories_seen: 2,
            commits_saved: 6,
            ..IngestStats::default()
        };
        report.filters.push(FilterReport {
            filter: "core".to_string(),
            since: default_since(),
            started_at: default_since(),
            outcome: FilterOutcome::Completed(stats),
        });
        report.filters.push(FilterReport {
            filter: "web".to_string(),
            since: default_since(),
            started_at: default_since(),
            outcome: FilterOutcome::Aborted {
                kind: ErrorKind::RateLimit,
                message: "HTTP 429".to_string(),
                stats: IngestStats {
                    repositories_seen: 1,
                    commits_saved: 1,
                    ..IngestStats::default()
                },
            },
        });

        let totals = report.totals();
        assert_eq!(totals.repositories_seen, 3);
        assert_eq!(totals.commits_saved, 7);
        assert!(report.filters[0].is_completed());
        assert!(!report.filters[1].is_completed());
    }
}
