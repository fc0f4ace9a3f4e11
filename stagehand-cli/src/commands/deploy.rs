//! Deployment command handlers
//!
//! Deploy, clean and rollback are fire-and-forget commands on the web
//! agent's topics. The agent's HTTP front is only read, for `status` and
//! for `deploy --wait`.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::*;
use stagehand_client::{RestProxy, publish};
use stagehand_core::domain::command::{CleanCommand, DeployCommand, DeployTarget, RollbackCommand};
use stagehand_core::domain::run::RunId;
use std::time::{Duration, Instant};

use crate::api::WebClient;
use crate::config::Config;
use crate::types::{DeploymentStatus, Generation};

#[derive(Clone, Copy, ValueEnum)]
pub enum Target {
    Prod,
    Staging,
}

impl From<Target> for DeployTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Prod => DeployTarget::Prod,
            Target::Staging => DeployTarget::Staging,
        }
    }
}

#[derive(Args)]
pub struct DeployArgs {
    pub run_id: RunId,

    #[arg(long, value_enum, default_value = "prod")]
    pub target: Target,

    /// Wait until production serves the run (seconds)
    #[arg(long)]
    pub wait: Option<u64>,
}

pub async fn request_deploy(args: DeployArgs, config: &Config) -> Result<()> {
    let command = DeployCommand {
        run_id: args.run_id,
        target: args.target.into(),
    };

    let proxy = RestProxy::new(&config.broker_url);
    publish(
        &proxy,
        &config.deploy_topic,
        Some(command.run_id.as_str()),
        &command,
    )
    .await?;

    println!(
        "{} Requested deploy of {} to {}",
        "✓".green(),
        command.run_id.as_str().bold(),
        command.target
    );

    match args.wait {
        Some(seconds) if command.target == DeployTarget::Prod => {
            wait_for_live(config, &command.run_id, Duration::from_secs(seconds)).await
        }
        _ => Ok(()),
    }
}

/// Poll the web agent until `run_id` is live or the deadline passes
async fn wait_for_live(config: &Config, run_id: &RunId, timeout: Duration) -> Result<()> {
    let client = WebClient::new(&config.web_url);
    let deadline = Instant::now() + timeout;

    loop {
        let status = client.deployment_status().await?;
        if is_live(&status, run_id) {
            println!("{} {} is live", "✓".green(), run_id.as_str().bold());
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("{} is not live after {}s", run_id, timeout.as_secs());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn is_live(status: &DeploymentStatus, run_id: &RunId) -> bool {
    status
        .current
        .as_ref()
        .and_then(|g| g.run_id.as_deref())
        .is_some_and(|live| live == run_id.as_str())
}

pub async fn request_clean(run_id: RunId, config: &Config) -> Result<()> {
    let proxy = RestProxy::new(&config.broker_url);
    let command = CleanCommand { run_id };
    publish(
        &proxy,
        &config.clean_topic,
        Some(command.run_id.as_str()),
        &command,
    )
    .await?;

    println!(
        "{} Requested removal of staged run {}",
        "✓".green(),
        command.run_id.as_str().bold()
    );
    Ok(())
}

pub async fn request_rollback(config: &Config) -> Result<()> {
    let proxy = RestProxy::new(&config.broker_url);
    publish(&proxy, &config.rollback_topic, None, &RollbackCommand::default()).await?;

    println!("{} Requested rollback of production", "✓".green());
    Ok(())
}

pub async fn show_status(config: &Config) -> Result<()> {
    let client = WebClient::new(&config.web_url);

    if !client.health().await? {
        println!("{}", "Web agent reports unhealthy.".red());
    }

    let status = client.deployment_status().await?;
    if status.generations.is_empty() {
        println!("{}", "Nothing deployed to production yet.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} generation(s) on disk:", status.generations.len()).bold()
    );
    println!();
    for generation in &status.generations {
        print_generation(generation);
    }
    Ok(())
}

fn print_generation(generation: &Generation) {
    let marker = if generation.live {
        "●".green()
    } else {
        "○".dimmed()
    };
    let run = match &generation.run_id {
        Some(run_id) => run_id.bold(),
        None => "(adopted)".dimmed(),
    };

    println!("  {} {}", marker, run);
    println!("    Generation:   {}", generation.name.dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(run_id: &str, live: bool) -> Generation {
        Generation {
            name: format!("01J0.{}", run_id),
            run_id: Some(run_id.to_string()),
            live,
        }
    }

    #[test]
    fn test_is_live() {
        let run = RunId::parse("r2").unwrap();
        let mut status = DeploymentStatus {
            current: None,
            generations: vec![generation("r1", false)],
        };
        assert!(!is_live(&status, &run));

        status.current = Some(generation("r1", true));
        assert!(!is_live(&status, &run));

        status.current = Some(generation("r2", true));
        assert!(is_live(&status, &run));
    }

    #[test]
    fn test_target_maps_to_deploy_target() {
        assert_eq!(DeployTarget::from(Target::Prod), DeployTarget::Prod);
        assert_eq!(DeployTarget::from(Target::Staging), DeployTarget::Staging);
    }
}
