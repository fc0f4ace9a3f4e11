//! Per-run working directory
//!
//! Stages keep the artifacts of a run under `<root>/<run_id>/` for
//! inspection. Writes replace whole files, so a redelivered message simply
//! overwrites what the first delivery left behind.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use stagehand_core::domain::run::RunId;

/// Directory holding the files of one run
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    /// Opens `<root>/<run_id>/`, creating it when missing
    pub async fn open(root: &Path, run_id: &RunId) -> Result<Self> {
        let dir = root.join(run_id.as_str());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes `name`, replacing any previous content atomically
    pub async fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let target = self.dir.join(name);
        let temp = self.dir.join(format!(".{}.tmp", name));

        fs::write(&temp, contents)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        fs::rename(&temp, &target)
            .await
            .with_context(|| format!("Failed to replace {}", target.display()))?;

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let run_id = RunId::parse("2024-01-01_A").unwrap();

        let workspace = RunWorkspace::open(root.path(), &run_id).await.unwrap();
        workspace.write("sitemap.xml", "first").await.unwrap();
        let path = workspace.write("sitemap.xml", "second").await.unwrap();

        assert_eq!(path, root.path().join("2024-01-01_A/sitemap.xml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        let names: Vec<_> = std::fs::read_dir(workspace.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["sitemap.xml"]);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let run_id = RunId::parse("r1").unwrap();
        RunWorkspace::open(root.path(), &run_id).await.unwrap();
        RunWorkspace::open(root.path(), &run_id).await.unwrap();
        assert!(root.path().join("r1").is_dir());
    }
}
