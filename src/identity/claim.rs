use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::holds::get_active_username_hold;
use super::normalize::{MAX_USERNAME_LEN, MIN_USERNAME_LEN, normalize_username};
use super::pending::live_pending_by_username;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::NormalizedUsername;

/// Who, if anyone, stands between `subject` and a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Availability {
    Free,
    OwnedBySubject,
    Taken,
}

/// Checks all three collections that share the handle namespace.
pub(crate) fn availability(
    store: &dyn Store,
    subject: &str,
    username_lower: &str,
    now: DateTime<Utc>,
) -> Result<Availability> {
    if let Some(hold) = get_active_username_hold(store, username_lower, now)? {
        if hold.identity_subject != subject {
            return Ok(Availability::Taken);
        }
    }

    if let Some(owner) = store.get_account_by_username(username_lower)? {
        return Ok(if owner.identity_subject == subject {
            Availability::OwnedBySubject
        } else {
            Availability::Taken
        });
    }

    if let Some(pending) = live_pending_by_username(store, username_lower, now)? {
        if pending.better_auth_user_id != subject {
            return Ok(Availability::Taken);
        }
    }

    Ok(Availability::Free)
}

/// Builds the candidate for `attempt`: the base itself, then the base
/// truncated to make room for a numeric suffix.
fn candidate(base: &NormalizedUsername, attempt: u32) -> Option<NormalizedUsername> {
    if attempt == 0 {
        return Some(base.clone());
    }

    let suffix = attempt.to_string();
    let stem: String = base
        .display
        .chars()
        .take(MAX_USERNAME_LEN.saturating_sub(suffix.len()))
        .collect();
    if stem.len() < MIN_USERNAME_LEN {
        return None;
    }

    normalize_username(&format!("{stem}{suffix}")).ok()
}

/// The bounded, deterministic search space for `base`.
pub fn candidates(
    base: &NormalizedUsername,
    attempts: u32,
) -> impl Iterator<Item = NormalizedUsername> + '_ {
    (0..attempts).filter_map(move |attempt| candidate(base, attempt))
}

/// Writes the handle for `subject`, then re-reads it to confirm attribution.
/// Returns `false` when another subject ended up owning it.
fn assign_verified(
    store: &dyn Store,
    subject: &str,
    username: &NormalizedUsername,
    now: DateTime<Utc>,
) -> Result<bool> {
    match store.upsert_account_username(subject, username, now) {
        Ok(()) => {}
        Err(Error::AlreadyExists) => return Ok(false),
        Err(e) => return Err(e),
    }

    let verified = store
        .get_account_by_username(&username.lower)?
        .is_some_and(|owner| owner.identity_subject == subject);
    if verified {
        // A subject reclaiming a handle it vacated no longer needs the hold.
        store.delete_username_hold(&username.lower)?;
    }
    Ok(verified)
}

/// Probes `base` and its numbered variants until one is verified for `subject`.
pub fn claim_with_retries(
    store: &dyn Store,
    subject: &str,
    base: &NormalizedUsername,
    attempts: u32,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    for candidate in candidates(base, attempts) {
        if availability(store, subject, &candidate.lower, now)? == Availability::Taken {
            debug!(candidate = %candidate.lower, "Skipping unavailable username");
            continue;
        }

        if assign_verified(store, subject, &candidate, now)? {
            info!(subject, username = %candidate.lower, "Claimed username");
            return Ok(candidate);
        }
        debug!(candidate = %candidate.lower, "Lost username race, trying next candidate");
    }

    Err(Error::AutoclaimFailed)
}

/// Guarantees `subject` ends up with `preferred` or the first free variant of it.
///
/// A hold on `preferred` by another subject fails immediately rather than
/// falling through to suffixed variants.
pub fn ensure_username_for_subject(
    store: &dyn Store,
    subject: &str,
    preferred: &NormalizedUsername,
    attempts: u32,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    if let Some(hold) = get_active_username_hold(store, &preferred.lower, now)? {
        if hold.identity_subject != subject {
            return Err(Error::UsernameTaken);
        }
    }

    match availability(store, subject, &preferred.lower, now)? {
        Availability::OwnedBySubject => {
            let current = store.get_account(subject)?.map(|account| account.username());
            if current.as_ref() != Some(preferred) {
                store.upsert_account_username(subject, preferred, now)?;
            }
            Ok(preferred.clone())
        }
        Availability::Free => {
            if assign_verified(store, subject, preferred, now)? {
                info!(subject, username = %preferred.lower, "Claimed preferred username");
                return Ok(preferred.clone());
            }
            claim_with_retries(store, subject, preferred, attempts, now)
        }
        Availability::Taken => claim_with_retries(store, subject, preferred, attempts, now),
    }
}
