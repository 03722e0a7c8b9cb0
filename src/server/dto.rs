use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::NormalizedUsername;

#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct AutoclaimEmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub token: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub const OK: OkResponse = OkResponse { ok: true };
}

#[derive(Debug, Serialize)]
pub struct UsernameResponse {
    pub ok: bool,
    pub username: NormalizedUsername,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub ok: bool,
    pub removed: usize,
}

/// Body of a finalize call; the identity id comes from the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}
