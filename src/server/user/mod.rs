mod me;
mod username;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(me::get_me))
        .route("/username", put(username::update_username))
        .route("/username/reserve", post(username::reserve_username))
        .route("/username/autoclaim", post(username::autoclaim_from_email))
        .route(
            "/username/autoclaim/session",
            post(username::autoclaim_from_session),
        )
}
