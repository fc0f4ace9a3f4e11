//! Run command handlers

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use colored::*;
use stagehand_client::{RestProxy, publish};
use stagehand_core::domain::message::WorkCommand;
use stagehand_core::domain::run::RunId;

use crate::config::Config;

#[derive(Args)]
pub struct RunArgs {
    /// Collection selector, e.g. OJ
    pub collection: String,

    /// Date the run is about (YYYY-MM-DD, default: today)
    #[arg(long, value_parser = parse_date)]
    pub date: Option<String>,
}

/// Accepts ISO calendar dates only
pub fn parse_date(value: &str) -> Result<String, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Publish a work command for the query stage
pub async fn start_run(args: RunArgs, config: &Config) -> Result<()> {
    let command = WorkCommand {
        date: args.date.unwrap_or_else(today),
        collection: args.collection,
    };

    let proxy = RestProxy::new(&config.broker_url);
    publish(&proxy, &config.work_topic, None, &command).await?;

    println!(
        "{} Requested run of {} for {}",
        "✓".green(),
        command.collection.bold(),
        command.date
    );
    println!(
        "  {}",
        "The query stage assigns the run id; follow it with `stagehand logs`.".dimmed()
    );
    Ok(())
}

pub fn print_run_id(date: Option<String>) {
    let date = date.unwrap_or_else(today);
    println!("{}", RunId::new(&date));
}
