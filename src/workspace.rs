//! Per-workspace filesystem layout and operation lock.
//!
//! A provisioned workspace mirrors the source project's directory tree.
//! Everything warren itself writes lives under a `.warren/` run directory
//! inside the workspace: service records, one log file per service kind,
//! and the operation lock.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{Layout, MAIN_WORKSPACE};

/// Directory (under the project root) holding provisioned workspaces.
pub const WORKSPACES_DIR: &str = "workspaces";

/// Run-directory name inside each workspace.
pub const RUN_DIR: &str = ".warren";

/// Paths of one workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    /// Layout for `agent` under `project_root`. The implicit `main`
    /// workspace is the source tree itself; agents live under
    /// `workspaces/<name>`.
    #[must_use]
    pub fn new(project_root: &Path, agent: &str) -> Self {
        let root = if agent == MAIN_WORKSPACE {
            project_root.to_path_buf()
        } else {
            project_root.join(WORKSPACES_DIR).join(agent)
        };
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.root.join(RUN_DIR)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.run_dir().join("logs")
    }

    #[must_use]
    pub fn services_dir(&self) -> PathBuf {
        self.run_dir().join("services")
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.run_dir().join("lock")
    }

    #[must_use]
    pub fn backend_project_dir(&self, layout: &Layout) -> PathBuf {
        self.root.join(&layout.backend_project_dir)
    }

    #[must_use]
    pub fn frontend_dir(&self, layout: &Layout) -> PathBuf {
        self.root.join(&layout.frontend_dir)
    }

    /// Whether this workspace has a frontend at all. Projects without the
    /// directory simply run no frontend service.
    #[must_use]
    pub fn has_frontend(&self, layout: &Layout) -> bool {
        self.frontend_dir(layout).is_dir()
    }
}

/// Exclusive per-workspace operation lock.
///
/// Operations on the same workspace are serialized to prevent double-start
/// races; operations on different workspaces touch disjoint resources and
/// run freely in parallel. The lock file is removed on drop; a crash
/// leaves it behind, which the error message tells the operator how to
/// clear.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the lock for the workspace.
    ///
    /// # Errors
    ///
    /// Fails when another operation holds the lock, or when the lock file
    /// cannot be created.
    pub fn acquire(paths: &WorkspacePaths) -> Result<Self> {
        let path = paths.lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                anyhow::bail!(
                    "another warren operation is running on this workspace (pid {}).\n\
                     If that process is gone, remove {} and retry.",
                    holder.trim(),
                    path.display()
                )
            }
            Err(e) => {
                Err(e).with_context(|| format!("creating lock file {}", path.display()))
            }
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
