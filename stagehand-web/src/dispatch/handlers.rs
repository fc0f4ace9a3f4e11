//! Command handlers
//!
//! Each handler decodes its own command schema and drives the deployment
//! engine. Engine errors become stage errors so the runtime logs them once
//! with the run id and moves on.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::info;

use stagehand_core::domain::command::{CleanCommand, DeployCommand, DeployTarget, RollbackCommand};
use stagehand_runner::runtime::StageError;

use crate::deploy::{DeployError, DeploymentEngine};
use crate::dispatch::CommandHandler;

impl From<DeployError> for StageError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::NotFound(_) | DeployError::NoPrevious => {
                StageError::NotFound(err.to_string())
            }
            other => StageError::Failed(other.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(command: JsonValue) -> Result<T, StageError> {
    serde_json::from_value(command).map_err(|e| StageError::Malformed(e.to_string()))
}

/// `{run_id, target}`: promote a staged run
pub struct PromoteHandler {
    engine: DeploymentEngine,
}

impl PromoteHandler {
    pub fn new(engine: DeploymentEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for PromoteHandler {
    fn name(&self) -> &str {
        "promote"
    }

    async fn handle(&self, command: JsonValue) -> Result<(), StageError> {
        let command: DeployCommand = decode(command)?;

        if command.target == DeployTarget::Staging {
            // Renders land in staging already
            info!("Run {} is already served from staging", command.run_id);
            return Ok(());
        }

        let promotion = self.engine.promote(&command.run_id).await?;
        info!(
            "Promoted {} → prod as generation {} ({}, {} retired)",
            command.run_id,
            promotion.generation.name,
            promotion.stats,
            promotion.retired.len()
        );
        Ok(())
    }
}

/// `{run_id}`: delete a staged run
pub struct CleanHandler {
    engine: DeploymentEngine,
}

impl CleanHandler {
    pub fn new(engine: DeploymentEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for CleanHandler {
    fn name(&self) -> &str {
        "clean"
    }

    async fn handle(&self, command: JsonValue) -> Result<(), StageError> {
        let command: CleanCommand = decode(command)?;
        self.engine.clean(&command.run_id).await?;
        Ok(())
    }
}

/// `{}`: serve the previous generation again
pub struct RollbackHandler {
    engine: DeploymentEngine,
}

impl RollbackHandler {
    pub fn new(engine: DeploymentEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandHandler for RollbackHandler {
    fn name(&self) -> &str {
        "rollback"
    }

    async fn handle(&self, command: JsonValue) -> Result<(), StageError> {
        let _: RollbackCommand = decode(command)?;
        let generation = self.engine.rollback().await?;
        info!(
            "Production now serves {} (run {})",
            generation.name,
            generation.run_id.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}
