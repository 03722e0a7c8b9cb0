use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::Result;
use crate::identity::{CleanupJob, IdentityService};

/// One dispatched registration and how many rows it removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub name: String,
    pub removed: usize,
}

/// Runs every registered job whose schedule is due at `now`.
///
/// A failing job is logged and left for the next tick; the remaining jobs
/// still run.
pub fn run_due_jobs(service: &IdentityService, now: DateTime<Utc>) -> Result<Vec<JobRun>> {
    let jobs = service.store().query(|store| store.list_cron_jobs())?;
    let mut runs = Vec::new();

    for job in jobs {
        let anchor = job.last_run_at.unwrap_or(job.created_at);
        match job.schedule.is_due(anchor, now) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(job = %job.name, "Skipping job with unusable schedule: {e}");
                continue;
            }
        }

        let Some(kind) = CleanupJob::from_handler(&job.handler) else {
            warn!(job = %job.name, handler = %job.handler, "Skipping job with unknown handler");
            continue;
        };

        let removed = match service.run_cleanup(kind, now) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(job = %job.name, "Scheduled job failed: {e}");
                continue;
            }
        };
        service
            .store()
            .mutation(|store| store.mark_cron_job_run(&job.name, now))?;

        runs.push(JobRun {
            name: job.name,
            removed,
        });
    }

    Ok(runs)
}

/// Ticks forever, dispatching due jobs.
pub async fn run(service: Arc<IdentityService>, tick: Duration) {
    info!("Scheduler running every {}s", tick.as_secs());
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let service = Arc::clone(&service);
        let result = tokio::task::spawn_blocking(move || run_due_jobs(&service, Utc::now())).await;

        match result {
            Ok(Ok(runs)) => {
                for run in runs {
                    info!(job = %run.name, removed = run.removed, "Scheduled job finished");
                }
            }
            Ok(Err(e)) => warn!("Scheduler tick failed: {e}"),
            Err(e) => warn!("Scheduler task panicked: {e}"),
        }
    }
}
