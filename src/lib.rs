//! LendBridge backend library
//!
//! Peer-to-peer loan lifecycle: proposal, field approval, investment
//! accumulation and disbursement, exposed over an axum HTTP API.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use config::Config;
use state::AppState;

/// Room for multipart boundaries and text fields on top of the file itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the application router with every route and middleware layer
pub fn build_router(app_state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(routes::loan_routes())
        .nest_service("/uploads", ServeDir::new(&config.storage_path))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(
            config.max_file_size + FORM_OVERHEAD_BYTES,
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    if config.environment.is_production() {
        router.layer(axum::middleware::from_fn(middleware::hsts_header))
    } else {
        router
    }
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
