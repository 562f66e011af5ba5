//! Progress reporting for ingestion runs.
//!
//! This module provides two modes of progress reporting:
//! - Console mode (TTY): short styled lines per filter on stderr
//! - Logging mode (non-TTY): structured logging using tracing

mod console_reporter;
mod logging;

use std::sync::Arc;

use console::Term;
use tally::ingest::{IngestProgress, ProgressCallback};

pub use console_reporter::ConsoleReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both console and logging modes.
pub enum ProgressReporter {
    Console(ConsoleReporter),
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stderr().is_term() {
            Self::Console(ConsoleReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn handle(&self, event: IngestProgress) {
        match self {
            Self::Console(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the orchestrator.
    pub fn into_callback(self: Arc<Self>) -> ProgressCallback {
        Box::new(move |event| self.handle(event))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
