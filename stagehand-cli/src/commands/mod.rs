//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod logs;
mod run;

pub use deploy::DeployArgs;
pub use logs::LogsArgs;
pub use run::RunArgs;

use anyhow::Result;
use clap::Subcommand;
use stagehand_core::domain::run::RunId;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a pipeline run for a collection
    Run(RunArgs),
    /// Print a fresh run id
    RunId {
        /// Date prefix (YYYY-MM-DD, default: today)
        #[arg(long, value_parser = run::parse_date)]
        date: Option<String>,
    },
    /// Promote a staged run
    Deploy(DeployArgs),
    /// Delete a staged run
    Clean {
        run_id: RunId,
    },
    /// Serve the previous production generation again
    Rollback,
    /// Show the live generation and the ones kept on disk
    Status,
    /// Follow the log channel
    Logs(LogsArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => run::start_run(args, config).await,
        Commands::RunId { date } => {
            run::print_run_id(date);
            Ok(())
        }
        Commands::Deploy(args) => deploy::request_deploy(args, config).await,
        Commands::Clean { run_id } => deploy::request_clean(run_id, config).await,
        Commands::Rollback => deploy::request_rollback(config).await,
        Commands::Status => deploy::show_status(config).await,
        Commands::Logs(args) => logs::follow_logs(args, config).await,
    }
}
