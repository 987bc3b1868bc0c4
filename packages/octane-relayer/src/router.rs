//! HTTP router setup.

use crate::handlers;
use crate::middleware::{inject_request_id, rate_limit};
use crate::state::AppState;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let max_concurrent = state.config.max_concurrent_requests;
    let cors = state.config.cors_origin;

    let router = Router::new()
        .route("/config", get(handlers::config))
        .route("/blockhash", get(handlers::blockhash))
        .route("/transfer", post(handlers::transfer))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(inject_request_id))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    timeout,
                ))
                .layer(GlobalConcurrencyLimitLayer::new(max_concurrent)),
        )
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
