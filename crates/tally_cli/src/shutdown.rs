use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;
use tokio::sync::watch;

/// Shutdown state shared between the Ctrl+C handler and running commands.
#[derive(Clone)]
pub(crate) struct Shutdown {
    flag: Arc<AtomicBool>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Flag handed to the orchestrator; checked between filters.
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    #[inline]
    pub(crate) fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been requested.
    pub(crate) async fn requested(&self) {
        let mut rx = self.rx.clone();
        // A closed channel means the handler is gone; treat that as never.
        if rx.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C lets the current filter finish; the second exits.
pub(crate) fn setup_shutdown_handler() -> Shutdown {
    let flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = watch::channel(false);
    let handler_flag = Arc::clone(&flag);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stderr().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current filter...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current filter");
        }

        handler_flag.store(true, Ordering::Release);
        let _ = tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });

    Shutdown { flag, rx }
}
