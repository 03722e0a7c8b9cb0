use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::internal::internal_router;
use super::user::user_router;
use crate::identity::IdentityService;
use crate::store::SqliteStore;

pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(identity: Arc<IdentityService>, data_dir: PathBuf) -> Self {
        Self { identity, data_dir }
    }

    #[must_use]
    pub fn store(&self) -> &SqliteStore {
        self.identity.store()
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", user_router())
        .nest("/internal", internal_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
