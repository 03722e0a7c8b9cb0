use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::cleanup::{
    CleanupJob, CronRegistration, ensure_cleanup_cron, purge_expired_hold_batch,
    purge_expired_pending_batch,
};
use super::holds::{reserve_username, update_username};
use super::normalize::normalize_email;
use super::pending::{
    AutoclaimOutcome, FinalizeIdentity, StagePendingIdentity, autoclaim_username,
    finalize_pending_identity, live_pending_by_id, stage_pending_identity,
};
use super::provider::{IdentityProvider, ProviderUser};
use crate::config::IdentityConfig;
use crate::error::Result;
use crate::store::SqliteStore;
use crate::types::{NormalizedEmail, NormalizedUsername, PendingIdentity, Session};

/// Entry point for every identity operation; each call is one store mutation
/// (or query), plus the provider lookup for session autoclaims.
pub struct IdentityService {
    store: Arc<SqliteStore>,
    provider: Arc<dyn IdentityProvider>,
    config: IdentityConfig,
}

impl IdentityService {
    pub fn new(
        store: Arc<SqliteStore>,
        provider: Arc<dyn IdentityProvider>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn get_me(&self, subject: &str) -> Result<Option<NormalizedUsername>> {
        self.store
            .query(|store| Ok(store.get_account(subject)?.map(|account| account.username())))
    }

    pub fn reserve_username(
        &self,
        session: &Session,
        display: &str,
        now: DateTime<Utc>,
    ) -> Result<NormalizedUsername> {
        let ttl = self.config.hold_ttl();
        self.store
            .mutation(|store| reserve_username(store, &session.subject, display, ttl, now))
    }

    pub fn update_username(
        &self,
        session: &Session,
        display: &str,
        now: DateTime<Utc>,
    ) -> Result<NormalizedUsername> {
        let ttl = self.config.hold_ttl();
        self.store
            .mutation(|store| update_username(store, &session.subject, display, ttl, now))
    }

    pub fn autoclaim_username_from_email(
        &self,
        session: &Session,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<AutoclaimOutcome> {
        let email = normalize_email(email)?;
        self.autoclaim(&session.subject, Some(email), now)
    }

    /// Autoclaims for the session's own subject. Missing sessions, missing
    /// emails and conflicts come back as outcomes rather than errors.
    pub async fn autoclaim_username_from_session(
        &self,
        session: Option<&Session>,
        now: DateTime<Utc>,
    ) -> Result<AutoclaimOutcome> {
        let Some(session) = session else {
            return Ok(AutoclaimOutcome::not_authenticated());
        };

        let settled = self.store.query(|store| {
            Ok(store.get_account(&session.subject)?.is_some()
                || live_pending_by_id(store, &session.subject, now)?.is_some())
        })?;

        let email = if settled {
            session.email.clone()
        } else {
            self.provider_email(session).await
        };
        let email = email.and_then(|email| match normalize_email(&email) {
            Ok(email) => Some(email),
            Err(e) => {
                warn!(subject = %session.subject, "Ignoring unusable email: {e}");
                None
            }
        });

        self.autoclaim(&session.subject, email, now)
    }

    fn autoclaim(
        &self,
        subject: &str,
        email: Option<NormalizedEmail>,
        now: DateTime<Utc>,
    ) -> Result<AutoclaimOutcome> {
        let attempts = self.config.claim_attempts;
        self.store
            .mutation(|store| autoclaim_username(store, subject, email.as_ref(), attempts, now))
    }

    /// Best-effort: a failed lookup falls back to the session's own email claim.
    async fn provider_email(&self, session: &Session) -> Option<String> {
        match self.provider.lookup_user(&session.subject).await {
            Ok(Some(ProviderUser {
                email: Some(email), ..
            })) => Some(email),
            Ok(_) => session.email.clone(),
            Err(e) => {
                warn!(subject = %session.subject, "Identity provider lookup failed, using session email: {e}");
                session.email.clone()
            }
        }
    }

    pub fn stage_pending_identity(
        &self,
        input: &StagePendingIdentity,
        now: DateTime<Utc>,
    ) -> Result<PendingIdentity> {
        let ttl = self.config.pending_ttl();
        self.store
            .mutation(|store| stage_pending_identity(store, input, ttl, now))
    }

    pub fn finalize_pending_identity(
        &self,
        input: &FinalizeIdentity,
        now: DateTime<Utc>,
    ) -> Result<NormalizedUsername> {
        let attempts = self.config.claim_attempts;
        self.store
            .mutation(|store| finalize_pending_identity(store, input, attempts, now))
    }

    pub fn cleanup_expired_pending_identities(&self, now: DateTime<Utc>) -> Result<usize> {
        self.run_cleanup(CleanupJob::PendingIdentities, now)
    }

    pub fn cleanup_expired_username_holds(&self, now: DateTime<Utc>) -> Result<usize> {
        self.run_cleanup(CleanupJob::UsernameHolds, now)
    }

    /// Sweeps in batches, one mutation per batch, until a short batch shows
    /// the collection has caught up.
    pub fn run_cleanup(&self, job: CleanupJob, now: DateTime<Utc>) -> Result<usize> {
        let batch_size = self.config.cleanup_batch_size;
        let mut removed = 0;

        loop {
            let batch = self.store.mutation(|store| match job {
                CleanupJob::PendingIdentities => purge_expired_pending_batch(store, now, batch_size),
                CleanupJob::UsernameHolds => purge_expired_hold_batch(store, now, batch_size),
            })?;
            removed += batch;
            if batch < batch_size {
                break;
            }
        }

        if removed > 0 {
            info!(job = job.name(), removed, "Cleanup removed expired rows");
        }
        Ok(removed)
    }

    pub fn ensure_pending_identity_cleanup_cron(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CronRegistration> {
        self.ensure_cleanup_cron(CleanupJob::PendingIdentities, now)
    }

    pub fn ensure_username_hold_cleanup_cron(&self, now: DateTime<Utc>) -> Result<CronRegistration> {
        self.ensure_cleanup_cron(CleanupJob::UsernameHolds, now)
    }

    pub fn ensure_cleanup_cron(
        &self,
        job: CleanupJob,
        now: DateTime<Utc>,
    ) -> Result<CronRegistration> {
        self.store
            .mutation(|store| ensure_cleanup_cron(store, job, &self.config, now))
    }

    pub fn ensure_cleanup_crons(&self, now: DateTime<Utc>) -> Result<Vec<CronRegistration>> {
        CleanupJob::ALL
            .into_iter()
            .map(|job| self.ensure_cleanup_cron(job, now))
            .collect()
    }
}
