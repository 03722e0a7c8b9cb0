use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};

use crate::auth::{RequireTrusted, TokenGenerator, TokenGrant};
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{CreateSessionRequest, CreateSessionResponse};
use crate::server::response::{ApiError, ApiResponse};

const MAX_TOKEN_RETRIES: usize = 3;

/// Mints a session token on behalf of the auth provider.
pub async fn create_session(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let subject = req.subject.trim();
    if subject.is_empty() {
        return Err(ApiError::bad_request("Subject cannot be empty"));
    }

    let now = Utc::now();
    let expires_at = match req.expires_in_seconds {
        Some(seconds) if seconds <= 0 => {
            return Err(ApiError::bad_request("expires_in_seconds must be positive"));
        }
        Some(seconds) => {
            let expires_at = Duration::try_seconds(seconds)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| ApiError::bad_request("expires_in_seconds is out of range"))?;
            Some(expires_at)
        }
        None => None,
    };

    let generator = TokenGenerator::new();
    for _ in 0..MAX_TOKEN_RETRIES {
        let grant = TokenGrant::Session {
            subject: subject.to_string(),
            email: req.email.clone(),
            expires_at,
        };
        let (token, raw_token) = generator.issue(grant, now)?;

        match state.store().mutation(|store| store.create_token(&token)) {
            Ok(()) => {
                tracing::info!(subject, "Issued session token");
                let response = CreateSessionResponse {
                    token: raw_token,
                    subject: subject.to_string(),
                    expires_at,
                };
                return Ok((StatusCode::CREATED, Json(ApiResponse::success(response))));
            }
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::internal("Failed to create token"))
}
