use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::failure_decay_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Forgive idle login failures (default every 15 minutes)
    async fn failure_decay_job(scheduler: Arc<Self>) {
        let every = scheduler.context.config.lockout.sweep_interval_secs;
        let mut interval = interval(Duration::from_secs(every));

        loop {
            interval.tick().await;

            match tasks::decay_login_failures(&scheduler.context).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Decay sweep lowered {} failed-login counters", count);
                    }
                }
                Err(e) => error!("Failed to run failed-login decay sweep: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
