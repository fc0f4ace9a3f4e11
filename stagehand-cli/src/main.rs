//! Stagehand CLI
//!
//! Operator tool for a Stagehand deployment: starts runs, moves them
//! between staging and production, and follows the monitoring channels.

mod api;
mod commands;
mod config;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Stagehand publishing pipeline CLI", long_about = None)]
struct Cli {
    /// REST proxy URL of the broker
    #[arg(long, env = "BROKER_URL", default_value = "http://localhost:8082")]
    broker_url: String,

    /// Web agent URL
    #[arg(long, env = "STAGEHAND_WEB_URL", default_value = "http://localhost:8080")]
    web_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::new(cli.broker_url, cli.web_url);

    handle_command(cli.command, &config).await
}
