use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::NormalizedUsername;

/// `data` is null until the subject has claimed a handle.
pub async fn get_me(
    RequireSession(session): RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let me = state.identity.get_me(&session.subject)?;

    Ok::<_, ApiError>(Json(ApiResponse::<NormalizedUsername> {
        data: me,
        error: None,
    }))
}
