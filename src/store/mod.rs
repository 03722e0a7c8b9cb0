mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the collection primitives available inside one transaction.
///
/// Implementations are handed out by [`SqliteStore::mutation`] and
/// [`SqliteStore::query`]; everything done through a single handle commits or
/// rolls back together.
pub trait Store {
    // Account operations
    fn get_account(&self, subject: &str) -> Result<Option<Account>>;
    fn get_account_by_username(&self, username_lower: &str) -> Result<Option<Account>>;
    /// Inserts or renames the account for `subject`.
    /// Returns `Error::AlreadyExists` when another account owns the handle.
    fn upsert_account_username(
        &self,
        subject: &str,
        username: &NormalizedUsername,
        now: DateTime<Utc>,
    ) -> Result<()>;
    fn update_account_profile(
        &self,
        subject: &str,
        email: Option<&str>,
        image_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    // Pending identity operations
    fn get_pending_identity(&self, better_auth_user_id: &str) -> Result<Option<PendingIdentity>>;
    fn get_pending_identity_by_username(
        &self,
        username_lower: &str,
    ) -> Result<Option<PendingIdentity>>;
    fn get_pending_identity_by_email(&self, email_lower: &str) -> Result<Option<PendingIdentity>>;
    fn insert_pending_identity(&self, pending: &PendingIdentity) -> Result<()>;
    fn update_pending_identity(&self, pending: &PendingIdentity) -> Result<()>;
    fn delete_pending_identity(&self, better_auth_user_id: &str) -> Result<bool>;
    /// Oldest first, `expires_at <= now`.
    fn list_expired_pending_identities(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PendingIdentity>>;

    // Username hold operations
    fn get_username_hold(&self, username_lower: &str) -> Result<Option<UsernameHold>>;
    /// Replaces any hold already recorded for the same handle.
    fn upsert_username_hold(&self, hold: &UsernameHold) -> Result<()>;
    fn delete_username_hold(&self, username_lower: &str) -> Result<bool>;
    /// Oldest first, `release_at <= now`.
    fn list_expired_username_holds(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UsernameHold>>;

    // Cron job operations
    fn get_cron_job(&self, name: &str) -> Result<Option<CronJob>>;
    fn list_cron_jobs(&self) -> Result<Vec<CronJob>>;
    fn insert_cron_job(&self, job: &CronJob) -> Result<()>;
    fn delete_cron_job(&self, name: &str) -> Result<bool>;
    fn mark_cron_job_run(&self, name: &str, at: DateTime<Utc>) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
    fn has_trusted_token(&self) -> Result<bool>;
}
