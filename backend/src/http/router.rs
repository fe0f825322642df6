//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        .route("/organizations", post(handlers::create_organization))
        // Classification
        .route("/organizations/{org_id}/checkins", get(handlers::get_checkins))
        .route(
            "/organizations/{org_id}/checkins/outstanding",
            get(handlers::get_outstanding),
        )
        .route(
            "/organizations/{org_id}/checkins/past-due",
            get(handlers::get_past_due),
        )
        // Roster
        .route(
            "/organizations/{org_id}/roster/reconcile",
            post(handlers::reconcile_roster),
        )
        // Check-ins and vacations
        .route("/users/{user_id}/checkins", post(handlers::submit_checkin))
        .route("/users/{user_id}/vacations", post(handlers::record_vacation))
        .route("/checkins/{checkin_id}/review", post(handlers::review_checkin))
        .route("/checkins/{checkin_id}/reopen", post(handlers::reopen_checkin));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
