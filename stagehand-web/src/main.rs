//! Stagehand Web Agent
//!
//! Serves the staging and production trees over HTTP and executes deploy,
//! clean and rollback commands from the broker. The HTTP front and the
//! command loop run side by side and share only the two root paths.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use stagehand_client::{RestProxy, RetryPolicy};
use stagehand_runner::logging::init_tracing;
use stagehand_runner::runtime::{RuntimeOptions, StageSettings, run_stage, shutdown_on_signal};
use stagehand_runner::service::{InMemoryLogBuffer, spawn_log_forwarder};

pub mod api;
pub mod config;
pub mod deploy;
pub mod dispatch;

use crate::config::Config;
use crate::deploy::DeploymentEngine;
use crate::dispatch::{CleanHandler, CommandDispatcher, PromoteHandler, RollbackHandler};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;

    let buffer = Arc::new(InMemoryLogBuffer::new(config.log_buffer_size));
    init_tracing(
        &config.component,
        "stagehand_web=info,stagehand_runner=info,tower_http=debug",
        buffer.clone(),
    );

    info!("Starting Stagehand Web Agent...");

    std::fs::create_dir_all(&config.staging_dir)
        .with_context(|| format!("Failed to create {}", config.staging_dir.display()))?;
    let engine = DeploymentEngine::open(config.staging_dir.clone(), config.prod_dir.clone())
        .context("Failed to open deployment engine")?;
    info!(
        "Serving staging={} and prod={}",
        config.staging_dir.display(),
        config.prod_dir.display()
    );

    let proxy = RestProxy::new(config.broker_url.clone());
    let shutdown = shutdown_on_signal();

    let forwarder = spawn_log_forwarder(
        buffer,
        Arc::new(proxy.clone().with_retry(RetryPolicy::none())),
        config.topics.logs.clone(),
        config.log_send_interval,
        shutdown.clone(),
    );

    // HTTP front
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    let app = api::create_router(engine.clone());
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await;
            if let Err(e) = &result {
                error!("HTTP server failed: {}", e);
                shutdown.cancel();
            }
            result
        })
    };

    // Command loop
    let dispatcher = CommandDispatcher::new(config.component.clone())
        .route(
            config.topics.deploy.clone(),
            Arc::new(PromoteHandler::new(engine.clone())),
        )
        .route(
            config.topics.clean.clone(),
            Arc::new(CleanHandler::new(engine.clone())),
        )
        .route(
            config.topics.rollback.clone(),
            Arc::new(RollbackHandler::new(engine)),
        );

    let settings = StageSettings {
        group: config.consumer_group.clone(),
        inputs: dispatcher.topics(),
        output: None,
        options: RuntimeOptions {
            heartbeat_interval: config.heartbeat_interval,
            ..RuntimeOptions::default()
        },
    };

    let result = run_stage(dispatcher, &proxy, settings, shutdown.clone()).await;
    match &result {
        Ok(stats) => info!(
            "Command loop stopped: processed={}, failed={}, discarded={}",
            stats.processed, stats.failed, stats.discarded
        ),
        Err(e) => error!("Command loop failed: {:#}", e),
    }

    shutdown.cancel();
    let served = server.await.context("HTTP server task panicked")?;
    let _ = forwarder.await;

    result?;
    served.context("HTTP server failed")?;
    info!("Web agent stopped");
    Ok(())
}
