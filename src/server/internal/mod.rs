//! Routes for trusted callers: the signup flow, the auth provider, the
//! scheduler and deployment bootstrap.

mod maintenance;
mod pending;
mod sessions;

use std::sync::Arc;

use axum::{Router, routing::post};

use crate::server::AppState;

pub fn internal_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route(
            "/pending-identities",
            post(pending::stage_pending_identity),
        )
        .route(
            "/pending-identities/{id}/finalize",
            post(pending::finalize_pending_identity),
        )
        // Cleanup sweeps
        .route(
            "/cleanup/pending-identities",
            post(maintenance::cleanup_pending_identities),
        )
        .route(
            "/cleanup/username-holds",
            post(maintenance::cleanup_username_holds),
        )
        // Cron registrations
        .route(
            "/cron/pending-identities",
            post(maintenance::ensure_pending_identity_cron),
        )
        .route(
            "/cron/username-holds",
            post(maintenance::ensure_username_hold_cron),
        )
}
