//! Render stage
//!
//! Renders the artifact tree of a run into `<staging>/<run_id>/`, the tree
//! the web agent later promotes. The tree is assembled in a hidden
//! `.<run_id>.partial` directory beside it and moved into place only when
//! complete, so a deploy command never picks up half a render.
//!
//! With `RENDER_COMMAND` set, the tree is produced by that external site
//! generator, run through `sh -c` inside the partial directory with
//! `RUN_DIR`, `RUN_ID` and `STAGING_DIR` in its environment. Without one,
//! a plain index page listing the sitemap URLs is written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use stagehand_core::domain::message::{Sitemap, StageMessage};
use stagehand_core::domain::run::RunId;

use crate::runtime::{Origin, Stage, StageError};
use crate::stages::sitemap::SITEMAP_FILE;

pub const METADATA_FILE: &str = "metadata.json";
pub const INDEX_FILE: &str = "index.html";

/// Hidden build directory of a run inside the staging root
pub fn partial_dir(staging: &Path, run_id: &RunId) -> PathBuf {
    staging.join(format!(".{}.partial", run_id))
}

/// Where a previous render of `run_id` sits while the new one is swapped in
///
/// `<staging>/<run_id>` is absent only while this directory exists.
pub fn retired_dir(staging: &Path, run_id: &RunId) -> PathBuf {
    staging.join(format!(".{}.old", run_id))
}

pub struct RenderStage {
    staging_dir: PathBuf,
    command: Option<String>,
}

impl RenderStage {
    pub fn new(staging_dir: PathBuf, command: Option<String>) -> Self {
        Self {
            staging_dir,
            command,
        }
    }

    async fn build(&self, message: &StageMessage<Sitemap>, dir: &Path) -> Result<()> {
        fs::write(dir.join(SITEMAP_FILE), &message.payload.sitemap)
            .await
            .context("Failed to write sitemap")?;

        let metadata = serde_json::to_vec_pretty(message).context("Failed to encode metadata")?;
        fs::write(dir.join(METADATA_FILE), metadata)
            .await
            .context("Failed to write metadata")?;

        match &self.command {
            Some(command) => self.run_generator(command, &message.run_id, dir).await,
            None => {
                let page = index_page(&message.run_id, &message.payload.sitemap);
                fs::write(dir.join(INDEX_FILE), page)
                    .await
                    .context("Failed to write index page")
            }
        }
    }

    async fn run_generator(&self, command: &str, run_id: &RunId, dir: &Path) -> Result<()> {
        info!("Generating static HTML files with '{}'", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .env("RUN_DIR", dir)
            .env("RUN_ID", run_id.as_str())
            .env("STAGING_DIR", &self.staging_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to start render command '{}'", command))?;

        if !output.stdout.is_empty() {
            debug!("Render output: {}", String::from_utf8_lossy(&output.stdout).trim_end());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Render command exited with {}: {}",
                output.status,
                stderr.trim_end()
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Stage for RenderStage {
    type Input = StageMessage<Sitemap>;
    type Output = ();

    fn name(&self) -> &str {
        "web_builder"
    }

    async fn process(
        &self,
        _origin: &Origin,
        message: StageMessage<Sitemap>,
    ) -> Result<Option<()>, StageError> {
        info!("Message received, run id is {}", message.run_id);

        let partial = partial_dir(&self.staging_dir, &message.run_id);
        let target = self.staging_dir.join(message.run_id.as_str());

        remove_if_exists(&partial).await?;
        fs::create_dir_all(&partial)
            .await
            .with_context(|| format!("Failed to create {}", partial.display()))?;

        if let Err(e) = self.build(&message, &partial).await {
            // Best-effort; the next render of this run starts over anyway
            let _ = fs::remove_dir_all(&partial).await;
            return Err(e.into());
        }

        let retired = retired_dir(&self.staging_dir, &message.run_id);
        replace_dir(&partial, &target, &retired).await?;
        info!("Site built and staged at {}", target.display());

        Ok(None)
    }
}

/// Moves `source` to `target`, replacing an earlier render of the same run
async fn replace_dir(source: &Path, target: &Path, retired: &Path) -> Result<()> {
    remove_if_exists(retired).await?;

    if fs::try_exists(target).await.unwrap_or(false) {
        fs::rename(target, retired)
            .await
            .with_context(|| format!("Failed to retire {}", target.display()))?;
    }

    fs::rename(source, target)
        .await
        .with_context(|| format!("Failed to move render into {}", target.display()))?;

    remove_if_exists(retired).await
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Index page listing every `<loc>` of the sitemap
fn index_page(run_id: &RunId, sitemap: &str) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("  <meta charset=\"utf-8\">\n");
    html.push_str(&format!("  <title>Run {}</title>\n", run_id));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("  <h1>Run {}</h1>\n  <ul>\n", run_id));
    // Locations are already XML-escaped, which is valid HTML as well
    for loc in sitemap_locations(sitemap) {
        html.push_str(&format!("    <li><a href=\"{0}\">{0}</a></li>\n", loc));
    }
    html.push_str("  </ul>\n</body>\n</html>\n");
    html
}

fn sitemap_locations(sitemap: &str) -> Vec<&str> {
    let mut locations = Vec::new();
    let mut rest = sitemap;
    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + "<loc>".len()..];
        let Some(end) = rest.find("</loc>") else {
            break;
        };
        locations.push(rest[..end].trim());
        rest = &rest[end..];
    }
    locations
}
