//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod backup;
mod currency;
mod proposal;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api_routes(settings.app.backup_max_body_bytes))
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

fn api_routes(backup_max_body_bytes: usize) -> Router<SharedState> {
    Router::new()
        // Backup routes
        .route("/backup/export", get(backup::export_backup))
        .route(
            "/backup/import",
            post(backup::import_backup).layer(DefaultBodyLimit::max(backup_max_body_bytes)),
        )
        // Proposal routes
        .route(
            "/proposals",
            get(proposal::list_proposals).post(proposal::create_proposal),
        )
        .route(
            "/proposals/{id}",
            get(proposal::get_proposal)
                .put(proposal::update_proposal)
                .delete(proposal::delete_proposal),
        )
        .route("/proposals/{id}/totals", get(proposal::get_proposal_totals))
        // Lookup routes
        .route("/currencies", get(currency::list_currencies))
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
