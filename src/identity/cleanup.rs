use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::error::Result;
use crate::store::Store;
use crate::types::{CronJob, Schedule};

/// The two periodic sweeps that keep time-bounded rows bounded in number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupJob {
    PendingIdentities,
    UsernameHolds,
}

impl CleanupJob {
    pub const ALL: [CleanupJob; 2] = [CleanupJob::PendingIdentities, CleanupJob::UsernameHolds];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CleanupJob::PendingIdentities => "cleanup-expired-pending-identities",
            CleanupJob::UsernameHolds => "cleanup-expired-username-holds",
        }
    }

    /// Handler reference stored with the registration.
    #[must_use]
    pub fn handler(self) -> &'static str {
        match self {
            CleanupJob::PendingIdentities => "identity::cleanup_expired_pending_identities",
            CleanupJob::UsernameHolds => "identity::cleanup_expired_username_holds",
        }
    }

    #[must_use]
    pub fn from_handler(handler: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|job| job.handler() == handler)
    }

    #[must_use]
    pub fn schedule(self, config: &IdentityConfig) -> Schedule {
        match self {
            CleanupJob::PendingIdentities => config.pending_cleanup_schedule(),
            CleanupJob::UsernameHolds => config.hold_cleanup_schedule(),
        }
    }
}

/// Deletes up to `limit` expired pending identities, oldest first.
pub fn purge_expired_pending_batch(
    store: &dyn Store,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<usize> {
    let batch = store.list_expired_pending_identities(now, limit)?;
    for pending in &batch {
        store.delete_pending_identity(&pending.better_auth_user_id)?;
    }
    Ok(batch.len())
}

/// Deletes up to `limit` expired holds, oldest first.
pub fn purge_expired_hold_batch(
    store: &dyn Store,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<usize> {
    let batch = store.list_expired_username_holds(now, limit)?;
    for hold in &batch {
        store.delete_username_hold(&hold.username_lower)?;
    }
    Ok(batch.len())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronRegistration {
    pub ok: bool,
    pub created: bool,
    pub id: String,
}

fn no_args() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

/// Registers `job` unless an identical registration already exists.
///
/// A registration whose handler, schedule or arguments drifted from the
/// expected ones is deleted and recreated.
pub fn ensure_cleanup_cron(
    store: &dyn Store,
    job: CleanupJob,
    config: &IdentityConfig,
    now: DateTime<Utc>,
) -> Result<CronRegistration> {
    let schedule = job.schedule(config);
    schedule.validate()?;

    if let Some(existing) = store.get_cron_job(job.name())? {
        if existing.handler == job.handler()
            && existing.schedule == schedule
            && existing.args == no_args()
        {
            return Ok(CronRegistration {
                ok: true,
                created: false,
                id: existing.id,
            });
        }

        store.delete_cron_job(job.name())?;
        info!(
            job = job.name(),
            old = %existing.schedule,
            new = %schedule,
            "Replacing drifted cron registration"
        );
    }

    let registration = CronJob {
        id: Uuid::new_v4().to_string(),
        name: job.name().to_string(),
        handler: job.handler().to_string(),
        schedule,
        args: no_args(),
        created_at: now,
        last_run_at: None,
    };
    store.insert_cron_job(&registration)?;
    info!(job = job.name(), schedule = %registration.schedule, "Registered cron job");

    Ok(CronRegistration {
        ok: true,
        created: true,
        id: registration.id,
    })
}
