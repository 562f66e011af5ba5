use std::sync::atomic::{AtomicUsize, Ordering};

use console::{Term, style};
use tally::ingest::IngestProgress;

/// Console reporter: one line per filter, plus a running commit counter.
pub struct ConsoleReporter {
    term: Term,
    saved: AtomicUsize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            saved: AtomicUsize::new(0),
        }
    }

    fn line(&self, text: String) {
        let _ = self.term.clear_line();
        let _ = self.term.write_line(&text);
    }

    pub fn handle(&self, event: IngestProgress) {
        match event {
            IngestProgress::SourceStarted { source, filters } => {
                self.line(format!(
                    "{} {} ({} filters)",
                    style("==>").cyan().bold(),
                    style(source.display_name()).bold(),
                    filters
                ));
            }

            IngestProgress::NoFilters { source } => {
                self.line(format!(
                    "{} {}: no filters configured (add one with `tally filters add {} <filter>`)",
                    style("!").yellow().bold(),
                    source.display_name(),
                    source
                ));
            }

            IngestProgress::FilterStarted { filter, since, .. } => {
                self.saved.store(0, Ordering::Relaxed);
                self.line(format!(
                    "  {} '{}' since {}",
                    style("->").dim(),
                    filter,
                    since.format("%Y-%m-%d %H:%M")
                ));
            }

            IngestProgress::CommitSaved { repository, .. } => {
                let saved = self.saved.fetch_add(1, Ordering::Relaxed) + 1;
                let _ = self.term.clear_line();
                let _ = self
                    .term
                    .write_str(&format!("     {} commits saved ({})", saved, repository));
            }

            IngestProgress::RepositorySkipped {
                repository, error, ..
            } => {
                self.line(format!(
                    "     {} {} skipped: {}",
                    style("!").yellow(),
                    repository,
                    error
                ));
            }

            IngestProgress::FilterCompleted { filter, stats, .. } => {
                self.line(format!(
                    "  {} '{}': {} saved, {} already present, {} skipped",
                    style("ok").green().bold(),
                    filter,
                    stats.commits_saved,
                    stats.commits_already_present,
                    stats.commits_skipped
                ));
            }

            IngestProgress::FilterAborted {
                filter,
                kind,
                message,
                ..
            } => {
                self.line(format!(
                    "  {} '{}' aborted ({}): {}",
                    style("x").red().bold(),
                    filter,
                    kind,
                    message
                ));
            }

            IngestProgress::Interrupted { remaining, .. } => {
                self.line(format!(
                    "{} interrupted, {} filter(s) not started",
                    style("!").yellow().bold(),
                    remaining
                ));
            }

            _ => {}
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
