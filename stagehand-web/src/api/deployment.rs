//! Deployment API Handlers
//!
//! Read-only view of the deployment engine. Promotion itself is only
//! reachable through the command topics.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::deploy::{DeploymentEngine, Generation};

#[derive(Debug, Serialize)]
pub struct DeploymentStatus {
    pub current: Option<Generation>,
    pub generations: Vec<Generation>,
}

/// GET /api/deployment
/// Live generation and the generations kept on disk
pub async fn deployment_status(
    State(engine): State<DeploymentEngine>,
) -> ApiResult<Json<DeploymentStatus>> {
    let generations = engine.history().await?;
    let current = generations.iter().find(|g| g.live).cloned();

    Ok(Json(DeploymentStatus {
        current,
        generations,
    }))
}
