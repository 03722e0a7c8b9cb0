use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::auth::{MaybeSession, RequireSession};
use crate::server::AppState;
use crate::server::dto::{AutoclaimEmailRequest, OkResponse, UsernameRequest};
use crate::server::response::{ApiError, ApiResponse};

pub async fn reserve_username(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UsernameRequest>,
) -> impl IntoResponse {
    state
        .identity
        .reserve_username(&session, &req.username, Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(OkResponse::OK)))
}

pub async fn update_username(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UsernameRequest>,
) -> impl IntoResponse {
    state
        .identity
        .update_username(&session, &req.username, Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(OkResponse::OK)))
}

/// Conflicts come back as `{ok: false, reason: "conflict"}` with status 200.
pub async fn autoclaim_from_email(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AutoclaimEmailRequest>,
) -> impl IntoResponse {
    let outcome = state
        .identity
        .autoclaim_username_from_email(&session, &req.email, Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(outcome)))
}

pub async fn autoclaim_from_session(
    MaybeSession(session): MaybeSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let outcome = state
        .identity
        .autoclaim_username_from_session(session.as_ref(), Utc::now())
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(outcome)))
}
