//! Run-scoped scratch directories for sandbox execution.
//!
//! Each run gets its own directory, and each population index gets its own slot
//! inside it, so concurrent evaluations never write the same candidate file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, warn};

/// An isolated workspace for one evolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    /// Absolute path to the workspace root.
    pub root: PathBuf,
    /// Directory name (includes problem id, timestamp, and random suffix).
    pub name: String,
}

impl RunWorkspace {
    /// Create a fresh workspace under `base_dir`.
    pub fn create(base_dir: &Path, problem_id: &str) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("create workspace dir {}", base_dir.display()))?;

        let name = build_workspace_name(problem_id, &generate_timestamp(), &generate_short_id());
        let root = base_dir.join(&name);
        fs::create_dir_all(&root)
            .with_context(|| format!("create workspace root {}", root.display()))?;
        debug!(root = %root.display(), "workspace created");

        Ok(Self { root, name })
    }

    /// Path of the slot reserved for population index `index`. Not created.
    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("slot-{index}"))
    }

    /// Create (if needed) and return the slot directory for `index`.
    pub fn slot(&self, index: usize) -> Result<PathBuf> {
        let path = self.slot_path(index);
        fs::create_dir_all(&path).with_context(|| format!("create slot {}", path.display()))?;
        Ok(path)
    }

    /// Remove the workspace and everything in it.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("remove workspace {}", self.root.display()))
    }

    /// Remove the workspace unless `keep` is set, logging instead of failing.
    pub fn finish(self, keep: bool) {
        if keep {
            debug!(root = %self.root.display(), "keeping workspace");
            return;
        }
        let root = self.root.clone();
        if let Err(err) = self.remove() {
            warn!(root = %root.display(), err = %err, "failed to remove workspace");
        }
    }
}

pub fn build_workspace_name(problem_id: &str, timestamp: &str, short_id: &str) -> String {
    format!("{problem_id}_{timestamp}_{short_id}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn workspace_name_uses_expected_format() {
        let name = build_workspace_name("fizzbuzz", "20260118_120000", "abc123");
        assert_eq!(name, "fizzbuzz_20260118_120000_abc123");
    }

    #[test]
    fn creates_distinct_workspaces_for_the_same_problem() {
        let temp = tempdir().expect("tempdir");
        let first = RunWorkspace::create(temp.path(), "fizzbuzz").expect("first");
        let second = RunWorkspace::create(temp.path(), "fizzbuzz").expect("second");

        assert!(first.root.is_dir());
        assert!(second.root.is_dir());
        assert_ne!(first.root, second.root);
    }

    #[test]
    fn slots_are_separate_directories() {
        let temp = tempdir().expect("tempdir");
        let workspace = RunWorkspace::create(temp.path(), "p").expect("workspace");

        let zero = workspace.slot(0).expect("slot 0");
        let one = workspace.slot(1).expect("slot 1");
        assert!(zero.is_dir());
        assert!(one.is_dir());
        assert_ne!(zero, one);
        assert_eq!(workspace.slot_path(1), one);
    }

    #[test]
    fn finish_removes_unless_kept() {
        let temp = tempdir().expect("tempdir");
        let kept = RunWorkspace::create(temp.path(), "kept").expect("kept");
        let kept_root = kept.root.clone();
        kept.finish(true);
        assert!(kept_root.exists());

        let dropped = RunWorkspace::create(temp.path(), "dropped").expect("dropped");
        let dropped_root = dropped.root.clone();
        dropped.finish(false);
        assert!(!dropped_root.exists());
    }
}
