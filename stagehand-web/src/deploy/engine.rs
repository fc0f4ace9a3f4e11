//! Deployment engine
//!
//! Production is served from a symbolic link, `<prod>`, that points at one
//! immutable generation directory under `<prod>.generations/`. Promoting a
//! run builds a new generation beside the live one and then renames a fresh
//! link over `<prod>`. The rename is the only step readers can observe, and
//! it replaces the link in one go, so a reader resolves either the old
//! generation or the new one and never a mix or a missing root.
//!
//! Generation directories are named `<ulid>.<run_id>`, so they sort in
//! promotion order. After a swap the engine keeps the live generation and
//! the one it replaced (the rollback slot) and deletes the rest.
//!
//! All mutating operations hold one lock and run their filesystem work on
//! the blocking pool.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::{Generator, Ulid};

use stagehand_core::domain::run::RunId;
use stagehand_runner::stages::render::{partial_dir, retired_dir};

use crate::deploy::tree::{self, TreeStats};

/// Errors of the deployment engine
///
/// Whatever the error, the served tree is the one that was live before the
/// operation started.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("staging tree for run {0} not found")]
    NotFound(RunId),

    #[error("no previous generation to roll back to")]
    NoPrevious,

    #[error("copy of run {run_id} incomplete: expected {expected}, found {copied}")]
    Incomplete {
        run_id: RunId,
        expected: TreeStats,
        copied: TreeStats,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("deployment task failed: {0}")]
    Task(String),
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> DeployError {
    let context = context.into();
    move |source| DeployError::Io { context, source }
}

/// One generation directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub name: String,
    /// Run the generation was promoted from; `None` for an adopted tree
    pub run_id: Option<String>,
    pub live: bool,
}

impl Generation {
    fn from_name(name: &str, live: bool) -> Self {
        Self {
            name: name.to_string(),
            run_id: name.split_once('.').map(|(_, run_id)| run_id.to_string()),
            live,
        }
    }
}

/// Result of a successful promotion
#[derive(Debug, Clone)]
pub struct Promotion {
    pub generation: Generation,
    pub stats: TreeStats,
    /// Generations deleted after the swap
    pub retired: Vec<String>,
}

/// Upper bound on waiting for a re-render swap: 50 × 20ms
const RENDER_SWAP_POLLS: u32 = 50;
const RENDER_SWAP_POLL: Duration = Duration::from_millis(20);

/// Paths of the staging and production areas
struct Layout {
    staging: PathBuf,
    prod: PathBuf,
    prod_name: String,
    parent: PathBuf,
    generations: PathBuf,
    names: std::sync::Mutex<Generator>,
}

/// Atomic promotion of staged runs into production
#[derive(Clone)]
pub struct DeploymentEngine {
    layout: Arc<Layout>,
    lock: Arc<Mutex<()>>,
}

impl DeploymentEngine {
    /// Opens the engine for `staging` and `prod`
    ///
    /// Blocking. Call it once at startup, before the HTTP front serves
    /// `prod`: it removes leftovers of interrupted promotions and converts
    /// a plain production directory into the first generation.
    pub fn open(staging: PathBuf, prod: PathBuf) -> Result<Self, DeployError> {
        let layout = Layout::new(staging, prod)?;
        layout.recover()?;

        Ok(Self {
            layout: Arc::new(layout),
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.layout.staging
    }

    pub fn prod_dir(&self) -> &Path {
        &self.layout.prod
    }

    /// Makes the served tree an exact copy of `<staging>/<run_id>`
    pub async fn promote(&self, run_id: &RunId) -> Result<Promotion, DeployError> {
        let run_id = run_id.clone();
        self.exclusive(move |layout| layout.promote(&run_id)).await
    }

    /// Deletes `<staging>/<run_id>`; returns whether it existed
    pub async fn clean(&self, run_id: &RunId) -> Result<bool, DeployError> {
        let run_id = run_id.clone();
        self.exclusive(move |layout| layout.clean(&run_id)).await
    }

    /// Serves the retained previous generation again
    pub async fn rollback(&self) -> Result<Generation, DeployError> {
        self.exclusive(Layout::rollback).await
    }

    /// The generation currently served, if anything was ever deployed
    pub async fn current(&self) -> Result<Option<Generation>, DeployError> {
        self.blocking(|layout| {
            Ok(layout
                .live_name()?
                .map(|name| Generation::from_name(&name, true)))
        })
        .await
    }

    /// All generations on disk, oldest first
    pub async fn history(&self) -> Result<Vec<Generation>, DeployError> {
        self.blocking(|layout| {
            let live = layout.live_name()?;
            Ok(layout
                .generation_names()?
                .iter()
                .map(|name| Generation::from_name(name, live.as_deref() == Some(name.as_str())))
                .collect())
        })
        .await
    }

    /// Runs a mutation on the blocking pool while holding the writer lock
    ///
    /// The guard moves into the blocking task: a caller that stops waiting
    /// (a transform timeout, a dropped future) does not release the lock
    /// while the filesystem work is still running.
    async fn exclusive<T, F>(&self, f: F) -> Result<T, DeployError>
    where
        F: FnOnce(&Layout) -> Result<T, DeployError> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        self.blocking(move |layout| {
            let _guard = guard;
            f(layout)
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, DeployError>
    where
        F: FnOnce(&Layout) -> Result<T, DeployError> + Send + 'static,
        T: Send + 'static,
    {
        let layout = Arc::clone(&self.layout);
        tokio::task::spawn_blocking(move || f(&layout))
            .await
            .map_err(|e| DeployError::Task(e.to_string()))?
    }
}

impl Layout {
    fn new(staging: PathBuf, prod: PathBuf) -> Result<Self, DeployError> {
        let invalid = || {
            io_err(format!("Invalid production path {}", prod.display()))(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path must name a directory",
            ))
        };

        let prod_name = prod
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(invalid)?;
        let parent = match prod.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let generations = parent.join(format!("{}.generations", prod_name));

        Ok(Self {
            staging,
            prod,
            prod_name,
            parent,
            generations,
            names: std::sync::Mutex::new(Generator::new()),
        })
    }

    fn next_ulid(&self) -> Ulid {
        let mut generator = match self.names.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        generator.generate().unwrap_or_else(|_| Ulid::new())
    }

    /// Startup cleanup and adoption of a plain production directory
    fn recover(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.generations).map_err(io_err(format!(
            "Failed to create {}",
            self.generations.display()
        )))?;

        for name in self.hidden_entries(&self.generations)? {
            let path = self.generations.join(&name);
            warn!("Removing leftover build {}", path.display());
            tree::remove_tree(&path)
                .map_err(io_err(format!("Failed to remove {}", path.display())))?;
        }

        let link_prefix = self.link_prefix();
        for name in self.hidden_entries(&self.parent)? {
            if name.starts_with(&link_prefix) {
                let path = self.parent.join(&name);
                debug!("Removing leftover link {}", path.display());
                fs::remove_file(&path)
                    .map_err(io_err(format!("Failed to remove {}", path.display())))?;
            }
        }

        match fs::symlink_metadata(&self.prod) {
            Ok(meta) if meta.file_type().is_symlink() => Ok(()),
            Ok(meta) if meta.is_dir() => self.adopt(),
            Ok(_) => Err(io_err(format!("Invalid production path {}", self.prod.display()))(
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory or link"),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(format!("Failed to inspect {}", self.prod.display()))(e)),
        }
    }

    fn adopt(&self) -> Result<(), DeployError> {
        let name = self.next_ulid().to_string();
        let destination = self.generations.join(&name);

        fs::rename(&self.prod, &destination).map_err(io_err(format!(
            "Failed to move {} into {}",
            self.prod.display(),
            destination.display()
        )))?;
        self.point_to(&name)?;

        info!("Adopted existing {} as generation {}", self.prod.display(), name);
        Ok(())
    }

    fn promote(&self, run_id: &RunId) -> Result<Promotion, DeployError> {
        let source = self.staging.join(run_id.as_str());
        if !self.wait_for_staged(run_id, &source) {
            return Err(DeployError::NotFound(run_id.clone()));
        }

        let expected = tree::measure(&source)
            .map_err(io_err(format!("Failed to read {}", source.display())))?;

        let previous = self.live_name()?;

        let name = format!("{}.{}", self.next_ulid(), run_id);
        let partial = self.generations.join(format!(".{}.partial", name));
        let generation = self.generations.join(&name);

        if let Err(e) = self.build(run_id, &source, &partial, expected) {
            let _ = tree::remove_tree(&partial);
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial, &generation) {
            let _ = tree::remove_tree(&partial);
            return Err(io_err(format!("Failed to finish {}", generation.display()))(e));
        }

        if let Err(e) = self.point_to(&name) {
            let _ = tree::remove_tree(&generation);
            return Err(e);
        }

        info!("Promoted {} to {} ({})", run_id, self.prod.display(), expected);

        let retired = self.retire(&name, previous.as_deref());
        Ok(Promotion {
            generation: Generation::from_name(&name, true),
            stats: expected,
            retired,
        })
    }

    fn build(
        &self,
        run_id: &RunId,
        source: &Path,
        partial: &Path,
        expected: TreeStats,
    ) -> Result<(), DeployError> {
        let copied = tree::copy_tree(source, partial).map_err(io_err(format!(
            "Failed to copy {} to {}",
            source.display(),
            partial.display()
        )))?;
        let on_disk = tree::measure(partial)
            .map_err(io_err(format!("Failed to verify {}", partial.display())))?;

        if copied != expected || on_disk != expected {
            return Err(DeployError::Incomplete {
                run_id: run_id.clone(),
                expected,
                copied: on_disk,
            });
        }

        debug!("Built {} ({})", partial.display(), on_disk);
        Ok(())
    }

    fn rollback(&self) -> Result<Generation, DeployError> {
        let live = self.live_name()?;
        let target = self
            .generation_names()?
            .into_iter()
            .filter(|name| Some(name) != live.as_ref())
            .next_back()
            .ok_or(DeployError::NoPrevious)?;

        self.point_to(&target)?;
        info!(
            "Rolled back {} from {} to {}",
            self.prod.display(),
            live.as_deref().unwrap_or("nothing"),
            target
        );

        Ok(Generation::from_name(&target, true))
    }

    fn clean(&self, run_id: &RunId) -> Result<bool, DeployError> {
        let target = self.staging.join(run_id.as_str());
        let removed = tree::remove_tree(&target)
            .map_err(io_err(format!("Failed to remove {}", target.display())))?;

        let partial = partial_dir(&self.staging, run_id);
        tree::remove_tree(&partial)
            .map_err(io_err(format!("Failed to remove {}", partial.display())))?;

        if removed {
            info!("Deleted staging run {}", run_id);
        } else {
            debug!("Staging run {} already absent", run_id);
        }
        Ok(removed)
    }

    /// Whether `source` is staged, waiting out a re-render being swapped in
    ///
    /// A re-render moves the previous tree aside before renaming the new one
    /// into place, so the run is briefly absent while its retired copy exists.
    fn wait_for_staged(&self, run_id: &RunId, source: &Path) -> bool {
        let retired = retired_dir(&self.staging, run_id);
        for _ in 0..RENDER_SWAP_POLLS {
            if source.is_dir() {
                return true;
            }
            if !retired.exists() {
                return false;
            }
            debug!("Run {} is being re-rendered, waiting", run_id);
            std::thread::sleep(RENDER_SWAP_POLL);
        }
        source.is_dir()
    }

    /// Atomically points `<prod>` at generation `name`
    fn point_to(&self, name: &str) -> Result<(), DeployError> {
        let link = self
            .parent
            .join(format!("{}{}", self.link_prefix(), Ulid::new()));
        let target = Path::new(&format!("{}.generations", self.prod_name)).join(name);

        symlink_dir(&target, &link)
            .map_err(io_err(format!("Failed to create link {}", link.display())))?;

        if let Err(e) = fs::rename(&link, &self.prod) {
            let _ = fs::remove_file(&link);
            return Err(io_err(format!("Failed to swap {}", self.prod.display()))(e));
        }

        Ok(())
    }

    /// Deletes every generation except `live` and `previous`
    fn retire(&self, live: &str, previous: Option<&str>) -> Vec<String> {
        let names = match self.generation_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to list generations for cleanup: {}", e);
                return Vec::new();
            }
        };

        let mut retired = Vec::new();
        for name in names {
            if name == live || Some(name.as_str()) == previous {
                continue;
            }
            match tree::remove_tree(&self.generations.join(&name)) {
                Ok(_) => {
                    debug!("Retired generation {}", name);
                    retired.push(name);
                }
                Err(e) => warn!("Failed to retire generation {}: {}", name, e),
            }
        }
        retired
    }

    fn live_name(&self) -> Result<Option<String>, DeployError> {
        match fs::read_link(&self.prod) {
            Ok(target) => Ok(target
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidInput) => {
                Ok(None)
            }
            Err(e) => Err(io_err(format!("Failed to read {}", self.prod.display()))(e)),
        }
    }

    /// Generation directory names, oldest first
    fn generation_names(&self) -> Result<Vec<String>, DeployError> {
        let entries = fs::read_dir(&self.generations)
            .map_err(io_err(format!("Failed to list {}", self.generations.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(io_err(format!("Failed to list {}", self.generations.display())))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn hidden_entries(&self, dir: &Path) -> Result<Vec<String>, DeployError> {
        let entries =
            fs::read_dir(dir).map_err(io_err(format!("Failed to list {}", dir.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(format!("Failed to list {}", dir.display())))?;
            if let Ok(name) = entry.file_name().into_string() {
                if name.starts_with('.') {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn link_prefix(&self) -> String {
        format!(".{}.link-", self.prod_name)
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        _dir: tempfile::TempDir,
        staging: PathBuf,
        engine: DeploymentEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();
        let engine = DeploymentEngine::open(staging.clone(), dir.path().join("prod")).unwrap();
        Fixture {
            _dir: dir,
            staging,
            engine,
        }
    }

    fn run(id: &str) -> RunId {
        RunId::parse(id).unwrap()
    }

    /// Replaces the staged tree of `run_id` with `files`
    fn stage(staging: &Path, run_id: &str, files: &[(&str, &str)]) {
        let dir = staging.join(run_id);
        let _ = fs::remove_dir_all(&dir);
        for (path, content) in files {
            let path = dir.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    fn served(prod: &Path) -> BTreeMap<String, String> {
        fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                    out.insert(rel, fs::read_to_string(&path).unwrap());
                }
            }
        }
        let root = fs::canonicalize(prod).unwrap();
        let mut out = BTreeMap::new();
        walk(&root, &root, &mut out);
        out
    }

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_promote_then_restage_drops_removed_files() {
        let fx = fixture();
        let id = run("run-2024-01-01_A");

        stage(&fx.staging, id.as_str(), &[("index.html", "v1"), ("sitemap.xml", "<urlset/>")]);
        fx.engine.promote(&id).await.unwrap();
        assert_eq!(
            served(fx.engine.prod_dir()),
            files(&[("index.html", "v1"), ("sitemap.xml", "<urlset/>")])
        );

        stage(&fx.staging, id.as_str(), &[("index.html", "v2")]);
        fx.engine.promote(&id).await.unwrap();
        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "v2")]));
    }

    #[tokio::test]
    async fn test_promote_is_idempotent() {
        let fx = fixture();
        let id = run("2024-01-01_A");
        stage(&fx.staging, id.as_str(), &[("index.html", "hi"), ("css/site.css", "body{}")]);

        let first = fx.engine.promote(&id).await.unwrap();
        let before = served(fx.engine.prod_dir());
        let second = fx.engine.promote(&id).await.unwrap();

        assert_eq!(served(fx.engine.prod_dir()), before);
        assert_eq!(first.stats, second.stats);
        assert_eq!(second.stats, TreeStats { files: 2, bytes: 8 });
        assert_eq!(second.generation.run_id.as_deref(), Some("2024-01-01_A"));
    }

    #[tokio::test]
    async fn test_missing_run_leaves_served_tree_alone() {
        let fx = fixture();
        stage(&fx.staging, "live", &[("index.html", "live")]);
        fx.engine.promote(&run("live")).await.unwrap();
        let history = fx.engine.history().await.unwrap();

        let result = fx.engine.promote(&run("ghost")).await;

        assert!(matches!(result, Err(DeployError::NotFound(id)) if id.as_str() == "ghost"));
        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "live")]));
        assert_eq!(fx.engine.history().await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_clean_is_idempotent() {
        let fx = fixture();
        stage(&fx.staging, "r1", &[("index.html", "x")]);
        fs::create_dir(fx.staging.join(".r1.partial")).unwrap();

        assert!(fx.engine.clean(&run("r1")).await.unwrap());
        assert!(!fx.staging.join("r1").exists());
        assert!(!fx.staging.join(".r1.partial").exists());

        assert!(!fx.engine.clean(&run("r1")).await.unwrap());
        assert!(!fx.engine.clean(&run("never-existed")).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_previous_generation_is_retained() {
        let fx = fixture();
        for n in 1..=4 {
            let id = format!("r{}", n);
            stage(&fx.staging, &id, &[("index.html", &id)]);
            fx.engine.promote(&run(&id)).await.unwrap();
        }

        let history = fx.engine.history().await.unwrap();
        let runs: Vec<_> = history.iter().map(|g| g.run_id.clone().unwrap()).collect();
        assert_eq!(runs, vec!["r3", "r4"]);
        assert!(history[1].live && !history[0].live);

        let current = fx.engine.current().await.unwrap().unwrap();
        assert_eq!(current.run_id.as_deref(), Some("r4"));
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_tree() {
        let fx = fixture();
        assert!(matches!(fx.engine.rollback().await, Err(DeployError::NoPrevious)));

        stage(&fx.staging, "old", &[("index.html", "old")]);
        fx.engine.promote(&run("old")).await.unwrap();
        assert!(matches!(fx.engine.rollback().await, Err(DeployError::NoPrevious)));

        stage(&fx.staging, "new", &[("index.html", "new")]);
        fx.engine.promote(&run("new")).await.unwrap();

        let restored = fx.engine.rollback().await.unwrap();
        assert_eq!(restored.run_id.as_deref(), Some("old"));
        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "old")]));

        // Rolling back again returns to the newer tree
        fx.engine.rollback().await.unwrap();
        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "new")]));
    }

    #[tokio::test]
    async fn test_plain_production_directory_is_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let prod = dir.path().join("prod");
        fs::create_dir(&staging).unwrap();
        fs::create_dir(&prod).unwrap();
        fs::write(prod.join("index.html"), "legacy").unwrap();

        let engine = DeploymentEngine::open(staging.clone(), prod.clone()).unwrap();

        assert!(fs::symlink_metadata(&prod).unwrap().file_type().is_symlink());
        assert_eq!(served(&prod), files(&[("index.html", "legacy")]));
        let current = engine.current().await.unwrap().unwrap();
        assert_eq!(current.run_id, None);

        stage(&staging, "r1", &[("index.html", "new")]);
        engine.promote(&run("r1")).await.unwrap();
        engine.rollback().await.unwrap();
        assert_eq!(served(&prod), files(&[("index.html", "legacy")]));
    }

    #[tokio::test]
    async fn test_open_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir(&staging).unwrap();
        let generations = dir.path().join("prod.generations");
        fs::create_dir_all(generations.join(".01ABC.r1.partial")).unwrap();
        fs::write(dir.path().join(".prod.link-01ABC"), "").unwrap();

        let engine = DeploymentEngine::open(staging, dir.path().join("prod")).unwrap();

        assert!(!generations.join(".01ABC.r1.partial").exists());
        assert!(!dir.path().join(".prod.link-01ABC").exists());
        assert!(engine.current().await.unwrap().is_none());
        assert!(engine.history().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_promote_keeps_the_writer_lock() {
        let fx = fixture();
        let big: Vec<(String, String)> = (0..2_000)
            .map(|n| (format!("pages/{}.html", n), "big".to_string()))
            .collect();
        let big: Vec<(&str, &str)> = big.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        stage(&fx.staging, "big", &big);
        stage(&fx.staging, "small", &[("index.html", "small")]);

        // The caller gives up long before the copy is done
        let abandoned =
            tokio::time::timeout(Duration::from_millis(1), fx.engine.promote(&run("big"))).await;
        fx.engine.promote(&run("small")).await.unwrap();

        // Whatever became of the first call, the later command wins
        let live = fx.engine.current().await.unwrap().unwrap();
        assert_eq!(live.run_id.as_deref(), Some("small"));
        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "small")]));

        let generations = fx.engine.prod_dir().with_extension("generations");
        let history = fx.engine.history().await.unwrap();
        assert!(history.len() <= 2);
        for generation in &history {
            assert!(generations.join(&generation.name).is_dir());
        }
        if abandoned.is_err() {
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].run_id.as_deref(), Some("big"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_promote_waits_out_a_rerender_swap() {
        let fx = fixture();
        // A re-render has moved the previous tree aside and not yet renamed
        // the new one into place
        stage(&fx.staging, ".r1.old", &[("index.html", "v1")]);
        stage(&fx.staging, ".r1.partial", &[("index.html", "v2")]);

        let staging = fx.staging.clone();
        let render = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            fs::rename(staging.join(".r1.partial"), staging.join("r1")).unwrap();
            fs::remove_dir_all(staging.join(".r1.old")).unwrap();
        });

        fx.engine.promote(&run("r1")).await.unwrap();
        render.join().unwrap();

        assert_eq!(served(fx.engine.prod_dir()), files(&[("index.html", "v2")]));
    }

    #[tokio::test]
    async fn test_failed_swap_leaves_no_generation_behind() {
        let fx = fixture();
        stage(&fx.staging, "r1", &[("index.html", "r1")]);
        // Something replaced the production link with a real directory
        fs::create_dir_all(fx.engine.prod_dir().join("keep")).unwrap();

        let result = fx.engine.promote(&run("r1")).await;

        assert!(matches!(result, Err(DeployError::Io { .. })));
        assert!(fx.engine.history().await.unwrap().is_empty());
        assert!(fx.engine.prod_dir().join("keep").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_never_see_mixed_trees() {
        let fx = fixture();
        stage(&fx.staging, "v0", &[("a.txt", "v0"), ("b.txt", "v0")]);
        fx.engine.promote(&run("v0")).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let prod = fx.engine.prod_dir().to_path_buf();
        let reader = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut consistent = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    // The served root never disappears
                    fs::read_to_string(prod.join("a.txt")).expect("served tree missing");

                    // A reader that resolved the root sees a single generation
                    let root = fs::canonicalize(&prod).expect("served root missing");
                    let a = fs::read_to_string(root.join("a.txt"));
                    let b = fs::read_to_string(root.join("b.txt"));
                    if let (Ok(a), Ok(b)) = (a, b) {
                        assert_eq!(a, b, "mixed generations");
                        consistent += 1;
                    }
                }
                consistent
            })
        };

        for n in 1..=25 {
            let id = format!("v{}", n);
            stage(&fx.staging, &id, &[("a.txt", &id), ("b.txt", &id)]);
            fx.engine.promote(&run(&id)).await.unwrap();
        }

        stop.store(true, Ordering::Relaxed);
        let consistent = reader.join().unwrap();
        assert!(consistent > 0);
        assert_eq!(served(fx.engine.prod_dir()), files(&[("a.txt", "v25"), ("b.txt", "v25")]));
    }
}
