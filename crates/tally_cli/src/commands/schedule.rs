use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::{MissedTickBehavior, interval};

use tally::ingest::IngestService;

use super::shared::build_orchestrator;
use crate::config::Config;
use crate::shutdown::Shutdown;

/// Trigger all sources every `interval_hours` until Ctrl+C.
///
/// The first run starts immediately. Each tick waits for its run to finish,
/// so a slow run delays the next tick instead of overlapping it.
pub(crate) async fn handle_schedule(
    interval_hours: Option<u64>,
    config: &Config,
    db: &Arc<DatabaseConnection>,
    shutdown: &Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let period = match interval_hours {
        Some(hours) => Duration::from_secs(hours.max(1) * 3600),
        None => config.schedule_interval(),
    };

    let service = IngestService::new(build_orchestrator(config, db, shutdown).await);
    if service.orchestrator().enabled_sources().is_empty() {
        return Err("No sources are enabled. Set [github] or [bitbucket] enabled = true.".into());
    }

    tracing::info!(
        interval_hours = period.as_secs() / 3600,
        sources = ?service.orchestrator().enabled_sources(),
        "Scheduler started"
    );

    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = shutdown.requested() => break,
        }

        if let Some(handle) = service.trigger_all().into_handle() {
            handle.wait().await;
        }

        if shutdown.is_requested() {
            break;
        }
        tracing::info!(next_in_hours = period.as_secs() / 3600, "Waiting for next scheduled run");
    }

    tracing::info!("Scheduler stopped");
    Ok(())
}
