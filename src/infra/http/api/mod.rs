pub mod error;
pub mod handlers;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/v1/generate/{kind}",
            post(handlers::generate_artifact),
        )
        .route(
            "/api/v1/fingerprint/{kind}",
            post(handlers::fingerprint_request),
        )
        .route(
            "/api/v1/artifacts/{kind}/{fingerprint}",
            get(handlers::get_artifact),
        )
        .route("/api/v1/jobs/{fingerprint}", get(handlers::job_status))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
