//! Router configuration for the Session API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
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
    // Permissive CORS: the front end is served from another origin in development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/check-env", get(handlers::check_env))
        // Session state
        .route("/v1/session", get(handlers::get_session))
        .route("/v1/session/events", get(handlers::stream_session))
        .route("/v1/session/discover", post(handlers::discover))
        .route("/v1/session/alerts", get(handlers::take_alerts))
        // Query editing
        .route("/v1/session/pattern", post(handlers::select_pattern))
        .route(
            "/v1/session/sliders",
            put(handlers::set_sliders).post(handlers::add_slider),
        )
        .route(
            "/v1/session/sliders/{name}",
            patch(handlers::update_slider).delete(handlers::remove_slider),
        )
        .route("/v1/session/treatment", put(handlers::set_treatment))
        .route("/v1/session/control", put(handlers::set_control))
        .route("/v1/session/ranges/active", put(handlers::set_active_range))
        .route("/v1/session/ranges/inactive", put(handlers::set_inactive_range))
        // Analysis and presentation
        .route("/v1/session/analysis", post(handlers::run_analysis))
        .route(
            "/v1/session/highlight",
            post(handlers::highlight_county).delete(handlers::clear_highlight),
        )
        .route("/v1/session/histogram", get(handlers::get_histogram))
        .route("/v1/session/statistics", get(handlers::get_statistics))
        .route("/v1/session/map", get(handlers::get_map))
        .route("/v1/session/counties", get(handlers::get_counties))
        .route("/v1/session/features", get(handlers::get_features))
        .route(
            "/v1/session/features/{column}",
            get(handlers::get_feature_histogram),
        )
        // Data files
        .route("/v1/files", get(handlers::list_files))
        .route("/v1/files/upload", post(handlers::upload_file))
        .route("/v1/files/reload", post(handlers::reload_files))
        // County tables can be large.
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
