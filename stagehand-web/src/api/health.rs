//! Health Check API Handler
//!
//! Liveness of the HTTP front, plus a check that the staging root it
//! serves is still reachable.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::deploy::DeploymentEngine;

/// GET /health
/// 200 "OK", or 503 when the staging root is gone
pub async fn health_check(State(engine): State<DeploymentEngine>) -> impl IntoResponse {
    match tokio::fs::metadata(engine.staging_dir()).await {
        Ok(meta) if meta.is_dir() => (StatusCode::OK, "OK"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "staging root unavailable"),
    }
}
