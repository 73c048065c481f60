//! Thin git helpers: worktree create/remove, branch existence, stash+pull.
//!
//! Branching mechanics beyond these operations are out of scope; this is
//! deliberately a minimal delegation layer over the `git` binary.

use std::path::Path;

use anyhow::{Context, Result};

use crate::command_runner::CommandRunner;

/// Branch name used for an agent's workspace.
#[must_use]
pub fn agent_branch(agent: &str) -> String {
    format!("agent/{agent}")
}

/// Create (or reset onto) the agent branch as a worktree at `target`.
///
/// # Errors
///
/// Fails when git reports an error other than the worktree already
/// existing at `target`.
pub async fn worktree_add<R: CommandRunner>(
    runner: &R,
    project_root: &Path,
    target: &Path,
    branch: &str,
) -> Result<()> {
    let target_str = target.to_string_lossy();
    let out = runner
        .run_in_dir(
            "git",
            &["worktree", "add", "-B", branch, target_str.as_ref()],
            project_root,
        )
        .await
        .context("running git worktree add")?;
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    if stderr.contains("already exists") || stderr.contains("already checked out") {
        // Idempotent re-create: the workspace is already a worktree.
        return Ok(());
    }
    anyhow::bail!("git worktree add failed for {target_str}: {}", stderr.trim())
}

/// Remove the worktree at `target`, tolerating one that git no longer
/// knows about.
///
/// # Errors
///
/// Fails when git reports an unexpected error.
pub async fn worktree_remove<R: CommandRunner>(
    runner: &R,
    project_root: &Path,
    target: &Path,
) -> Result<()> {
    let target_str = target.to_string_lossy();
    let out = runner
        .run_in_dir(
            "git",
            &["worktree", "remove", "--force", target_str.as_ref()],
            project_root,
        )
        .await
        .context("running git worktree remove")?;
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    if stderr.contains("is not a working tree") || stderr.contains("No such file") {
        return Ok(());
    }
    anyhow::bail!("git worktree remove failed for {target_str}: {}", stderr.trim())
}

/// Whether `branch` exists in the repository at `project_root`.
///
/// # Errors
///
/// Fails only when git cannot be spawned.
pub async fn branch_exists<R: CommandRunner>(
    runner: &R,
    project_root: &Path,
    branch: &str,
) -> Result<bool> {
    let refname = format!("refs/heads/{branch}");
    let out = runner
        .run_in_dir("git", &["rev-parse", "--verify", "--quiet", &refname], project_root)
        .await
        .context("running git rev-parse")?;
    Ok(out.status.success())
}

/// Stash local changes (including untracked files) and pull with rebase.
///
/// # Errors
///
/// Fails when the pull fails; a no-op stash is not an error.
pub async fn stash_and_pull<R: CommandRunner>(runner: &R, dir: &Path) -> Result<()> {
    let out = runner
        .run_in_dir("git", &["stash", "--include-untracked"], dir)
        .await
        .context("running git stash")?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        anyhow::bail!("git stash failed: {}", stderr.trim());
    }
    let out = runner
        .run_in_dir("git", &["pull", "--rebase"], dir)
        .await
        .context("running git pull")?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        anyhow::bail!("git pull failed: {}", stderr.trim());
    }
    Ok(())
}
