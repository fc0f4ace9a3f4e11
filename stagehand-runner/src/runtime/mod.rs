//! Stage runtime
//!
//! The generic driver every Stagehand process runs: the data-path stages use
//! it directly, the web agent uses it with a command-dispatching stage.

pub mod driver;
pub mod heartbeat;
pub mod process;
pub mod stage;

pub use driver::{RuntimeOptions, RuntimeStats, StageRuntime};
pub use heartbeat::Heartbeater;
pub use process::{StageSettings, run_stage};
pub use stage::{Origin, Stage, StageError};

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a token that is cancelled on Ctrl-C or SIGTERM
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
