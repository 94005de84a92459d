//! Background maintenance jobs.

mod scheduler;

use std::sync::Arc;

use quorum_core::ports::RateLimitStore;

pub use scheduler::{Scheduler, SchedulerConfig};

/// Register the stale window purge on the configured schedule.
pub async fn schedule_window_purge(
    scheduler: &Scheduler,
    store: Arc<dyn RateLimitStore>,
) -> Result<uuid::Uuid, tokio_cron_scheduler::JobSchedulerError> {
    let schedule = scheduler.config().purge_cron.clone();

    scheduler
        .add_cron("purge_rate_windows", &schedule, move || {
            let store = store.clone();
            async move { purge_expired_windows(store.as_ref()).await }
        })
        .await
}

/// One purge pass. Failures are logged and retried on the next tick.
pub async fn purge_expired_windows(store: &dyn RateLimitStore) {
    match store.purge_expired().await {
        Ok(0) => tracing::debug!(store = store.name(), "No expired rate windows"),
        Ok(purged) => tracing::info!(store = store.name(), purged, "Purged expired rate windows"),
        Err(e) => tracing::warn!(store = store.name(), error = %e, "Rate window purge failed"),
    }
}
