use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NormalizedUsername, Schedule};

/// One row per authenticated identity that has claimed a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub identity_subject: String,
    pub username_lower: String,
    pub username_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn username(&self) -> NormalizedUsername {
        NormalizedUsername {
            lower: self.username_lower.clone(),
            display: self.username_display.clone(),
        }
    }
}

/// A staged signup whose owning account is not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIdentity {
    pub better_auth_user_id: String,
    pub email: String,
    pub email_lower: String,
    pub username_lower: String,
    pub username_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingIdentity {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn username(&self) -> NormalizedUsername {
        NormalizedUsername {
            lower: self.username_lower.clone(),
            display: self.username_display.clone(),
        }
    }
}

/// A time-boxed embargo on a handle its owner renamed away from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameHold {
    pub identity_subject: String,
    pub username_lower: String,
    pub username_display: String,
    pub created_at: DateTime<Utc>,
    pub release_at: DateTime<Utc>,
}

impl UsernameHold {
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.release_at > now
    }
}

/// A credential minted for the auth provider's session or for trusted callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    /// Trusted tokens reach the internal routes and carry no subject.
    pub is_trusted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The authenticated caller of an end-user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub email: Option<String>,
}

/// A periodic job registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub handler: String,
    pub schedule: Schedule,
    pub args: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}
