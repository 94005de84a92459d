//! Periodic maintenance on top of tokio-cron-scheduler.

use std::future::Future;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const DEFAULT_PURGE_CRON: &str = "0 */5 * * * *";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `SCHEDULER_ENABLED`; jobs are registered but never fire when false.
    pub enabled: bool,
    /// Six-field cron expression (seconds first) for the stale window purge.
    pub purge_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_cron: DEFAULT_PURGE_CRON.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            purge_cron: std::env::var("RATE_LIMIT_PURGE_CRON")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.purge_cron),
        }
    }
}

pub struct Scheduler {
    inner: JobScheduler,
    config: SchedulerConfig,
    running: bool,
}

impl Scheduler {
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        Ok(Self {
            inner: JobScheduler::new().await?,
            config,
            running: false,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `task` on `schedule`. Ticks may overlap if a run outlasts the period.
    pub async fn add_cron<F, Fut>(
        &self,
        job_name: &'static str,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_id, _scheduler| {
            let task = task.clone();
            Box::pin(async move {
                tracing::debug!(job = job_name, "Job tick");
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(job = job_name, schedule = %schedule, job_id = %id, "Job registered");
        Ok(id)
    }

    pub async fn start(&mut self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("SCHEDULER_ENABLED=false, background jobs will not run");
            return Ok(());
        }

        self.inner.start().await?;
        self.running = true;
        tracing::info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        if !self.running {
            return Ok(());
        }

        self.inner.shutdown().await?;
        self.running = false;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}
