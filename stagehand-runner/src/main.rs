//! Stagehand Runner
//!
//! Runs one data-path stage of the pipeline as a long-lived process.
//!
//! Architecture:
//! - Configuration: environment variables with defaults
//! - Runtime: generic poll/transform/produce loop with heartbeats
//! - Stages: query, sitemap and render transforms
//! - Logging: stdout plus best-effort forwarding to the log channel
//!
//! Usage: `stagehand-runner <query|sitemap|render>` (or `STAGE=...`).

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{error, info};

use stagehand_client::{RestProxy, RetryPolicy};
use stagehand_runner::config::Config;
use stagehand_runner::logging::init_tracing;
use stagehand_runner::repository::HttpSparqlRepository;
use stagehand_runner::runtime::{
    RuntimeOptions, RuntimeStats, StageSettings, run_stage, shutdown_on_signal,
};
use stagehand_runner::service::{InMemoryLogBuffer, spawn_log_forwarder};
use stagehand_runner::stages::{QueryCatalog, QueryStage, RenderStage, SitemapStage};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "stagehand-runner")]
#[command(about = "Runs one stage of the Stagehand pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Stage to run
    #[arg(value_enum, env = "STAGE")]
    stage: StageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageKind {
    /// Work command → raw SPARQL results
    Query,
    /// Raw results → sitemap
    Sitemap,
    /// Sitemap → staged site
    Render,
}

impl StageKind {
    /// Component name, as used on the heartbeat and log channels
    fn component(self) -> &'static str {
        match self {
            StageKind::Query => "query_agent",
            StageKind::Sitemap => "sitemap_builder",
            StageKind::Render => "web_builder",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let component = cli.stage.component();

    let config = Config::from_env(component);
    config.validate().context("Invalid configuration")?;

    let buffer = Arc::new(InMemoryLogBuffer::new(config.log_buffer_size));
    init_tracing(
        component,
        "stagehand_runner=info,stagehand_client=info",
        buffer.clone(),
    );

    info!("Starting {}", component);
    info!(
        "Loaded configuration: broker_url={}, consumer_group={}",
        config.broker_url, config.consumer_group
    );

    let proxy = RestProxy::new(config.broker_url.clone());
    let shutdown = shutdown_on_signal();

    // Log shipping must never wait on broker retries
    let log_producer = Arc::new(proxy.clone().with_retry(RetryPolicy::none()));
    let forwarder = spawn_log_forwarder(
        buffer,
        log_producer,
        config.topics.logs.clone(),
        config.log_send_interval,
        shutdown.clone(),
    );

    let result = run(cli.stage, &config, &proxy, shutdown.clone()).await;
    match &result {
        Ok(stats) => info!(
            "{} stopped: processed={}, failed={}, discarded={}, heartbeats={}",
            component, stats.processed, stats.failed, stats.discarded, stats.heartbeats
        ),
        Err(e) => error!("{} failed: {:#}", component, e),
    }

    shutdown.cancel();
    let _ = forwarder.await;

    result.map(|_| ())
}

async fn run(
    kind: StageKind,
    config: &Config,
    proxy: &RestProxy,
    shutdown: CancellationToken,
) -> Result<RuntimeStats> {
    let options = RuntimeOptions {
        heartbeat_interval: config.heartbeat_interval,
        transform_timeout: config.transform_timeout,
        ..RuntimeOptions::default()
    };
    let topics = &config.topics;

    match kind {
        StageKind::Query => {
            let catalog = QueryCatalog::load(&config.query_catalog)?;
            info!(
                "Loaded {} queries: {}",
                catalog.len(),
                catalog.actions().collect::<Vec<_>>().join(", ")
            );
            let sparql = Arc::new(HttpSparqlRepository::new(config.sparql_timeout)?);
            let stage = QueryStage::new(catalog, sparql, config.runs_dir.clone());
            let settings = StageSettings {
                group: config.consumer_group.clone(),
                inputs: vec![topics.work.clone()],
                output: Some(topics.raw_results.clone()),
                options,
            };
            run_stage(stage, proxy, settings, shutdown).await
        }
        StageKind::Sitemap => {
            let stage = SitemapStage::new(config.runs_dir.clone());
            let settings = StageSettings {
                group: config.consumer_group.clone(),
                inputs: vec![topics.raw_results.clone()],
                output: Some(topics.sitemap.clone()),
                options,
            };
            run_stage(stage, proxy, settings, shutdown).await
        }
        StageKind::Render => {
            match &config.render_command {
                Some(command) => info!("Render command: {}", command),
                None => info!("No render command configured, using the built-in index page"),
            }
            let stage = RenderStage::new(config.staging_dir.clone(), config.render_command.clone());
            let settings = StageSettings {
                group: config.consumer_group.clone(),
                inputs: vec![topics.sitemap.clone()],
                output: None,
                options,
            };
            run_stage(stage, proxy, settings, shutdown).await
        }
    }
}
