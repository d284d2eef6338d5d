pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::guidance::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Guidance API
        .route("/api/v1/career/guidance", post(handlers::handle_guidance))
        .route(
            "/api/v1/career/bundles/status",
            get(handlers::handle_bundle_status),
        )
        .with_state(state)
}
