//! Progress events emitted while ingesting.

use chrono::{DateTime, Utc};

use crate::entity::error_kind::ErrorKind;
use crate::entity::source::Source;

use super::types::IngestStats;

/// Progress events emitted during an ingestion run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum IngestProgress {
    /// A source run started.
    SourceStarted {
        source: Source,
        /// Number of configured filters.
        filters: usize,
    },

    /// A source has no configured filters; nothing to do.
    NoFilters { source: Source },

    /// Starting one filter.
    FilterStarted {
        source: Source,
        filter: String,
        since: DateTime<Utc>,
    },

    /// Walking the commits of a matched repository.
    RepositoryStarted {
        source: Source,
        repository: String,
    },

    /// A repository was skipped after a recoverable failure.
    RepositorySkipped {
        source: Source,
        repository: String,
        error: String,
    },

    /// A new commit was written.
    CommitSaved {
        source: Source,
        repository: String,
        sha: String,
    },

    /// A commit was skipped after a recoverable failure.
    CommitSkipped {
        source: Source,
        repository: String,
        sha: String,
        kind: ErrorKind,
    },

    /// A filter finished and its watermark advanced.
    FilterCompleted {
        source: Source,
        filter: String,
        stats: IngestStats,
    },

    /// A filter hit a run-aborting error; its watermark is unchanged.
    FilterAborted {
        source: Source,
        filter: String,
        kind: ErrorKind,
        message: String,
    },

    /// Shutdown was requested; remaining filters were not started.
    Interrupted { source: Source, remaining: usize },

    /// A source run finished.
    SourceCompleted {
        source: Source,
        completed: usize,
        aborted: usize,
    },
}

/// Callback for progress updates during ingestion.
pub type ProgressCallback = Box<dyn Fn(IngestProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: IngestProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_emit_with_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), IngestProgress::NoFilters { source: Source::GitHub });
        emit(
            Some(&callback),
            IngestProgress::SourceCompleted {
                source: Source::GitHub,
                completed: 1,
                aborted: 0,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_without_callback() {
        emit(
            None,
            IngestProgress::NoFilters {
                source: Source::BitbucketCloud,
            },
        );
    }

    #[test]
    fn test_progress_debug() {
        let event = IngestProgress::FilterAborted {
            source: Source::GitHub,
            filter: "core".to_string(),
            kind: ErrorKind::RateLimit,
            message: "HTTP 429: rate limit exceeded".to_string(),
        };

        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("FilterAborted"));
        assert!(debug_str.contains("core"));
        assert!(debug_str.contains("RateLimit"));
    }
}
