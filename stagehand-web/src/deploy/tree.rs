//! Directory tree helpers
//!
//! Blocking filesystem walks used by the deployment engine. Only regular
//! files and directories are considered; symbolic links inside a staged
//! tree are skipped by both the copy and the measurement, so a link can
//! never pull content from outside the staging area into production.

use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Size of a tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: u64,
    pub bytes: u64,
}

impl std::fmt::Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} files, {} bytes", self.files, self.bytes)
    }
}

/// Counts regular files and their bytes below `root`
pub fn measure(root: &Path) -> io::Result<TreeStats> {
    let mut stats = TreeStats::default();
    measure_into(root, &mut stats)?;
    Ok(stats)
}

fn measure_into(dir: &Path, stats: &mut TreeStats) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            measure_into(&entry.path(), stats)?;
        } else if file_type.is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(())
}

/// Copies the tree at `source` into `target`, which must not exist yet
///
/// Returns what was copied.
pub fn copy_tree(source: &Path, target: &Path) -> io::Result<TreeStats> {
    fs::create_dir(target)?;
    let mut stats = TreeStats::default();
    copy_into(source, target, &mut stats)?;
    Ok(stats)
}

fn copy_into(source: &Path, target: &Path, stats: &mut TreeStats) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let from = entry.path();
        let to = target.join(entry.file_name());

        if file_type.is_dir() {
            fs::create_dir(&to)?;
            copy_into(&from, &to, stats)?;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(&from, &to)?;
            stats.files += 1;
        } else {
            warn!("Skipping {} (not a regular file)", from.display());
        }
    }
    Ok(())
}

/// Removes `path` recursively; a missing path is not an error
///
/// Returns whether anything was removed.
pub fn remove_tree(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
