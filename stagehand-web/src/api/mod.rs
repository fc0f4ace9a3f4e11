//! API Module
//!
//! HTTP front of the web agent. Static files only, plus health and a
//! read-only deployment status:
//! - `/staging/<run_id>/...` is served from the staging root; hidden
//!   entries (render build directories) are never served
//! - everything else is served from the production root

pub mod deployment;
pub mod error;
pub mod health;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::deploy::DeploymentEngine;

/// Create the router serving the engine's staging and production roots
pub fn create_router(engine: DeploymentEngine) -> Router {
    let staging: Router = Router::new()
        .fallback_service(ServeDir::new(engine.staging_dir()))
        .layer(middleware::from_fn(hide_build_dirs));
    let prod = ServeDir::new(engine.prod_dir());

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Deployment status
        .route("/api/deployment", get(deployment::deployment_status))
        // Static trees
        .nest_service("/staging", staging)
        .fallback_service(prod)
        // Add state and middleware
        .with_state(engine)
        .layer(TraceLayer::new_for_http())
}

/// 404 for paths whose first segment is hidden (`.<run_id>.partial`, ...)
async fn hide_build_dirs(request: Request, next: Next) -> Response {
    let first = request
        .uri()
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();

    if first.starts_with('.') || first.to_ascii_lowercase().starts_with("%2e") {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}
