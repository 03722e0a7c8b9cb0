use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::info;

use super::claim::ensure_username_for_subject;
use super::holds::throw_if_username_on_hold;
use super::normalize::{
    normalize_email, normalize_username, username_from_email, username_from_name,
    validate_image_base64,
};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{NormalizedEmail, NormalizedUsername, PendingIdentity};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePendingIdentity {
    pub better_auth_user_id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeIdentity {
    pub better_auth_user_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn drop_if_expired(
    store: &dyn Store,
    pending: Option<PendingIdentity>,
    now: DateTime<Utc>,
) -> Result<Option<PendingIdentity>> {
    match pending {
        Some(pending) if pending.is_expired(now) => {
            store.delete_pending_identity(&pending.better_auth_user_id)?;
            Ok(None)
        }
        pending => Ok(pending),
    }
}

pub(crate) fn live_pending_by_id(
    store: &dyn Store,
    better_auth_user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<PendingIdentity>> {
    let pending = store.get_pending_identity(better_auth_user_id)?;
    drop_if_expired(store, pending, now)
}

pub(crate) fn live_pending_by_username(
    store: &dyn Store,
    username_lower: &str,
    now: DateTime<Utc>,
) -> Result<Option<PendingIdentity>> {
    let pending = store.get_pending_identity_by_username(username_lower)?;
    drop_if_expired(store, pending, now)
}

fn live_pending_by_email(
    store: &dyn Store,
    email_lower: &str,
    now: DateTime<Utc>,
) -> Result<Option<PendingIdentity>> {
    let pending = store.get_pending_identity_by_email(email_lower)?;
    drop_if_expired(store, pending, now)
}

/// Reserves a handle and email for a signup the auth provider has not confirmed yet.
pub fn stage_pending_identity(
    store: &dyn Store,
    input: &StagePendingIdentity,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<PendingIdentity> {
    let id = input.better_auth_user_id.trim();
    if id.is_empty() {
        return Err(Error::validation("betterAuthUserId is required"));
    }
    let username = normalize_username(&input.username)?;
    let email = normalize_email(&input.email)?;
    let image_base64 = validate_image_base64(input.image_base64.as_deref())?;

    let existing = live_pending_by_id(store, id, now)?;

    throw_if_username_on_hold(store, &username.lower, now)?;
    if let Some(owner) = store.get_account_by_username(&username.lower)? {
        if owner.identity_subject != id {
            return Err(Error::UsernameTaken);
        }
    }
    if let Some(other) = live_pending_by_username(store, &username.lower, now)? {
        if other.better_auth_user_id != id {
            return Err(Error::UsernameTaken);
        }
    }
    if let Some(other) = live_pending_by_email(store, &email.lower, now)? {
        if other.better_auth_user_id != id {
            return Err(Error::UsernameTaken);
        }
    }

    let pending = PendingIdentity {
        better_auth_user_id: id.to_string(),
        email: email.original,
        email_lower: email.lower,
        username_lower: username.lower,
        username_display: username.display,
        image_base64,
        created_at: existing.as_ref().map_or(now, |row| row.created_at),
        expires_at: now + ttl,
    };

    if existing.is_some() {
        store.update_pending_identity(&pending)?;
    } else {
        store.insert_pending_identity(&pending)?;
    }
    info!(
        better_auth_user_id = %pending.better_auth_user_id,
        username = %pending.username_lower,
        "Staged pending identity"
    );
    Ok(pending)
}

fn image_data_url(image_base64: &str) -> String {
    let mime = if image_base64.starts_with("iVBOR") {
        "image/png"
    } else if image_base64.starts_with("/9j/") {
        "image/jpeg"
    } else if image_base64.starts_with("R0lG") {
        "image/gif"
    } else if image_base64.starts_with("UklGR") {
        "image/webp"
    } else {
        "application/octet-stream"
    };
    format!("data:{mime};base64,{image_base64}")
}

/// Converts a staged (or provider-reported) identity into a permanent account.
pub fn finalize_pending_identity(
    store: &dyn Store,
    input: &FinalizeIdentity,
    attempts: u32,
    now: DateTime<Utc>,
) -> Result<NormalizedUsername> {
    let id = input.better_auth_user_id.trim();
    if id.is_empty() {
        return Err(Error::validation("betterAuthUserId is required"));
    }
    let email = normalize_email(&input.email)?;
    let pending = live_pending_by_id(store, id, now)?;

    let username = match store.get_account(id)? {
        Some(account) => account.username(),
        None => {
            let preferred = match &pending {
                Some(pending) => pending.username(),
                None => match input.name.as_deref().and_then(username_from_name) {
                    Some(from_name) => from_name,
                    None => username_from_email(&email.original)?,
                },
            };
            ensure_username_for_subject(store, id, &preferred, attempts, now)?
        }
    };

    let image_url = input.image_url.clone().or_else(|| {
        pending
            .as_ref()
            .and_then(|p| p.image_base64.as_deref())
            .map(image_data_url)
    });
    store.update_account_profile(id, Some(&email.original), image_url.as_deref(), now)?;
    store.delete_pending_identity(id)?;

    info!(better_auth_user_id = id, username = %username.lower, "Finalized identity");
    Ok(username)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoclaimFailure {
    NotAuthenticated,
    NoEmail,
    Conflict,
}

impl AutoclaimFailure {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AutoclaimFailure::NotAuthenticated => "not_authenticated",
            AutoclaimFailure::NoEmail => "no_email",
            AutoclaimFailure::Conflict => "conflict",
        }
    }
}

/// Result of a self-serve autoclaim; failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoclaimOutcome {
    Claimed(NormalizedUsername),
    Failed {
        reason: AutoclaimFailure,
        message: String,
    },
}

impl AutoclaimOutcome {
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::Failed {
            reason: AutoclaimFailure::NotAuthenticated,
            message: "Not authenticated".to_string(),
        }
    }

    #[must_use]
    pub fn no_email() -> Self {
        Self::Failed {
            reason: AutoclaimFailure::NoEmail,
            message: "No email is associated with this account".to_string(),
        }
    }
}

impl Serialize for AutoclaimOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AutoclaimOutcome::Claimed(username) => {
                let mut state = serializer.serialize_struct("AutoclaimOutcome", 2)?;
                state.serialize_field("ok", &true)?;
                state.serialize_field("username", username)?;
                state.end()
            }
            AutoclaimOutcome::Failed { reason, message } => {
                let mut state = serializer.serialize_struct("AutoclaimOutcome", 3)?;
                state.serialize_field("ok", &false)?;
                state.serialize_field("reason", reason.as_str())?;
                state.serialize_field("message", message)?;
                state.end()
            }
        }
    }
}

/// Autoclaims for `subject`, preferring a staged handle over one derived from `email`.
///
/// An account that already has a handle is returned as-is without writing.
pub fn autoclaim_username(
    store: &dyn Store,
    subject: &str,
    email: Option<&NormalizedEmail>,
    attempts: u32,
    now: DateTime<Utc>,
) -> Result<AutoclaimOutcome> {
    if let Some(account) = store.get_account(subject)? {
        return Ok(AutoclaimOutcome::Claimed(account.username()));
    }

    let preferred = match (live_pending_by_id(store, subject, now)?, email) {
        (Some(pending), _) => pending.username(),
        (None, Some(email)) => username_from_email(&email.original)?,
        (None, None) => return Ok(AutoclaimOutcome::no_email()),
    };

    match ensure_username_for_subject(store, subject, &preferred, attempts, now) {
        Ok(username) => {
            if let Some(email) = email {
                store.update_account_profile(subject, Some(&email.original), None, now)?;
            }
            store.delete_pending_identity(subject)?;
            Ok(AutoclaimOutcome::Claimed(username))
        }
        Err(e) if e.is_claim_conflict() => Ok(AutoclaimOutcome::Failed {
            reason: AutoclaimFailure::Conflict,
            message: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}
