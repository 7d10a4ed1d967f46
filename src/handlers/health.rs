//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::loan::LoanService;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check(State(service): State<Arc<LoanService>>) -> Json<HealthResponse> {
    let healthy = service.is_healthy().await;

    let (status, database) = if healthy {
        ("healthy", "connected")
    } else {
        ("unhealthy", "unavailable")
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: database.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
