//! Stage process wiring
//!
//! Connects a stage to the REST proxy and runs it until shutdown. Shared by
//! the runner binary and the web agent.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use stagehand_client::{RestProxy, RetryPolicy};
use stagehand_core::topics;

use crate::runtime::driver::{RuntimeOptions, RuntimeStats, StageRuntime};
use crate::runtime::stage::Stage;

/// Channels and tunables of one stage process
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub group: String,
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub options: RuntimeOptions,
}

/// Subscribes `stage` to its inputs and drives it until `shutdown`
///
/// Only subscription failures (after the proxy's retries) are returned;
/// everything that goes wrong per message is contained in the runtime.
pub async fn run_stage<S: Stage>(
    stage: S,
    proxy: &RestProxy,
    settings: StageSettings,
    shutdown: CancellationToken,
) -> Result<RuntimeStats> {
    info!(
        "Subscribing {} (group {}) to {:?}",
        stage.name(),
        settings.group,
        settings.inputs
    );

    let consumer = tokio::select! {
        _ = shutdown.cancelled() => return Ok(RuntimeStats::default()),
        consumer = proxy.consumer(&settings.group, &settings.inputs) => consumer
            .with_context(|| format!("Failed to subscribe to {:?}", settings.inputs))?,
    };

    // The runtime retries output itself and must not stall on heartbeats
    let producer = Arc::new(proxy.clone().with_retry(RetryPolicy::none()));
    let heartbeat_topic = topics::heartbeat(stage.name());
    let runtime = StageRuntime::new(
        stage,
        Box::new(consumer),
        producer,
        settings.output,
        heartbeat_topic,
        settings.options,
    );

    Ok(runtime.run(shutdown).await)
}
