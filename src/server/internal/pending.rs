use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireTrusted;
use crate::identity::{FinalizeIdentity, StagePendingIdentity};
use crate::server::AppState;
use crate::server::dto::{FinalizeRequest, OkResponse, UsernameResponse};
use crate::server::response::{ApiError, ApiResponse};

pub async fn stage_pending_identity(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
    Json(req): Json<StagePendingIdentity>,
) -> impl IntoResponse {
    state.identity.stage_pending_identity(&req, Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(OkResponse::OK)))
}

pub async fn finalize_pending_identity(
    _trusted: RequireTrusted,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<FinalizeRequest>,
) -> impl IntoResponse {
    let input = FinalizeIdentity {
        better_auth_user_id: id,
        email: req.email,
        name: req.name,
        image_url: req.image_url,
    };
    let username = state.identity.finalize_pending_identity(&input, Utc::now())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UsernameResponse {
        ok: true,
        username,
    })))
}
