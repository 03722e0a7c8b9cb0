use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::normalize::normalize_username;
use super::pending::live_pending_by_username;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{NormalizedUsername, UsernameHold};

/// Returns the hold on `username_lower` if it is still active.
/// An expired hold is deleted on the way out.
pub fn get_active_username_hold(
    store: &dyn Store,
    username_lower: &str,
    now: DateTime<Utc>,
) -> Result<Option<UsernameHold>> {
    match store.get_username_hold(username_lower)? {
        Some(hold) if !hold.is_active(now) => {
            store.delete_username_hold(username_lower)?;
            Ok(None)
        }
        hold => Ok(hold),
    }
}

/// Fails with the taken error if any subject holds the handle.
pub fn throw_if_username_on_hold(
    store: &dyn Store,
    username_lower: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    match get_active_username_hold(store, username_lower, now)? {
        Some(_) => Err(Error::UsernameTaken),
        None => Ok(()),
    }
}

/// Lifts an active hold early, but only for the subject that vacated the handle.
pub fn release_username_hold(
    store: &dyn Store,
    username_lower: &str,
    subject: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    match get_active_username_hold(store, username_lower, now)? {
        Some(hold) if hold.identity_subject == subject => {
            store.delete_username_hold(username_lower)?;
            info!(subject, username = username_lower, "Released username hold early");
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn create_username_hold(
    store: &dyn Store,
    subject: &str,
    username: &NormalizedUsername,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<UsernameHold> {
    let hold = UsernameHold {
        identity_subject: subject.to_string(),
        username_lower: username.lower.clone(),
        username_display: username.display.clone(),
        created_at: now,
        release_at: now + ttl,
    };
    store.upsert_username_hold(&hold)?;
    info!(subject, username = %hold.username_lower, release_at = %hold.release_at, "Placed username hold");
    Ok(hold)
}

/// Whether the handle being replaced is embargoed after a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HoldPolicy {
    /// The caller may reclaim a handle it recently vacated.
    AllowSelfRelease,
    /// Any active hold refuses the claim.
    Strict,
}

/// Assigns exactly `username` to `subject`, embargoing the handle it replaces.
pub(crate) fn assign_exact_username(
    store: &dyn Store,
    subject: &str,
    username: &NormalizedUsername,
    policy: HoldPolicy,
    hold_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    match policy {
        HoldPolicy::Strict => throw_if_username_on_hold(store, &username.lower, now)?,
        HoldPolicy::AllowSelfRelease => {
            if get_active_username_hold(store, &username.lower, now)?.is_some()
                && !release_username_hold(store, &username.lower, subject, now)?
            {
                return Err(Error::UsernameTaken);
            }
        }
    }

    let current = store.get_account(subject)?;
    if current.as_ref().is_some_and(|account| account.username() == *username) {
        return Ok(username.clone());
    }

    if let Some(owner) = store.get_account_by_username(&username.lower)? {
        if owner.identity_subject != subject {
            return Err(Error::UsernameTaken);
        }
    }
    if let Some(pending) = live_pending_by_username(store, &username.lower, now)? {
        if pending.better_auth_user_id != subject {
            return Err(Error::UsernameTaken);
        }
    }

    if let Some(previous) = current.filter(|account| account.username_lower != username.lower) {
        create_username_hold(store, subject, &previous.username(), hold_ttl, now)?;
    }

    store
        .upsert_account_username(subject, username, now)
        .map_err(|e| match e {
            Error::AlreadyExists => Error::UsernameTaken,
            e => e,
        })?;
    if store
        .get_pending_identity(subject)?
        .is_some_and(|pending| pending.username_lower == username.lower)
    {
        store.delete_pending_identity(subject)?;
    }
    info!(subject, username = %username.lower, "Assigned username");
    Ok(username.clone())
}

/// Renames `subject` to `display`, placing a hold on the handle it leaves.
pub fn update_username(
    store: &dyn Store,
    subject: &str,
    display: &str,
    hold_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    let username = normalize_username(display)?;
    assign_exact_username(store, subject, &username, HoldPolicy::AllowSelfRelease, hold_ttl, now)
}

/// Claims exactly `display` for `subject`; any active hold refuses it.
pub fn reserve_username(
    store: &dyn Store,
    subject: &str,
    display: &str,
    hold_ttl: Duration,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    let username = normalize_username(display)?;
    assign_exact_username(store, subject, &username, HoldPolicy::Strict, hold_ttl, now)
}
