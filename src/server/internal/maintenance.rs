use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::auth::RequireTrusted;
use crate::server::AppState;
use crate::server::dto::CleanupResponse;
use crate::server::response::{ApiError, ApiResponse};

pub async fn cleanup_pending_identities(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let removed = state
        .identity
        .cleanup_expired_pending_identities(Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(CleanupResponse {
        ok: true,
        removed,
    })))
}

pub async fn cleanup_username_holds(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let removed = state.identity.cleanup_expired_username_holds(Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(CleanupResponse {
        ok: true,
        removed,
    })))
}

pub async fn ensure_pending_identity_cron(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let registration = state
        .identity
        .ensure_pending_identity_cleanup_cron(Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(registration)))
}

pub async fn ensure_username_hold_cron(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let registration = state
        .identity
        .ensure_username_hold_cleanup_cron(Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(registration)))
}
