//! Environment-file discovery and role-based synthesis.
//!
//! Walks the source tree for live env files, classifies each by path,
//! copies it to the equivalent relative path under the workspace, and
//! applies the role-specific overrides from [`crate::envfile`]. Re-running
//! against an unchanged source tree is byte-stable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::allocator::Allocation;
use crate::command_runner::CommandRunner;
use crate::config::Layout;
use crate::envfile::{self, OverrideContext, Role};
use crate::errors::EnvSynthError;

/// Directories never descended into: dependency caches, version-control
/// metadata, build output, and prior workspace output.
pub const EXCLUDED_DIRS: [&str; 9] = [
    ".git",
    "node_modules",
    "target",
    ".venv",
    "venv",
    "dist",
    "__pycache__",
    "workspaces",
    ".warren",
];

/// One discovered env file. Recomputed on every run, never cached: the
/// source tree may change between invocations.
#[derive(Debug, Clone)]
pub struct EnvFileDescriptor {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub role: Role,
    /// Required files abort provisioning when missing or unreadable;
    /// optional failures are downgraded to warnings in the outcome.
    pub required: bool,
}

/// What happened to one target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthAction {
    Written,
    /// Target exists and is tracked by version control; left untouched.
    SkippedTracked,
}

/// Result of one synthesis run.
#[derive(Debug, Default)]
pub struct SynthesisOutcome {
    pub files: Vec<(EnvFileDescriptor, SynthAction)>,
    pub warnings: Vec<String>,
}

/// How to handle a target file that version control already tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Ask interactively before overwriting.
    Prompt,
    /// Overwrite without asking (`--yes`).
    Force,
    /// Never overwrite; skip with a warning (non-interactive default).
    Skip,
}

/// Walk `source_root` and collect every live env file with its role.
///
/// # Errors
///
/// Fails when the walk itself fails (unreadable directory), or when no
/// backend app env template exists: provisioning cannot continue without
/// the required template.
pub fn discover(source_root: &Path, layout: &Layout) -> Result<Vec<EnvFileDescriptor>> {
    let mut found = Vec::new();
    let walker = WalkDir::new(source_root).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .is_some_and(|n| EXCLUDED_DIRS.contains(&n)))
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", source_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !envfile::is_env_file_name(name) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_root)
            .with_context(|| format!("relativizing {}", entry.path().display()))?
            .to_path_buf();
        let role = envfile::classify(&relative, layout);
        found.push(EnvFileDescriptor {
            source_path: entry.path().to_path_buf(),
            relative_path: relative,
            role,
            required: role == Role::BackendApp,
        });
    }

    if !found.iter().any(|d| d.role == Role::BackendApp) {
        return Err(EnvSynthError::MissingRequired {
            path: Path::new(&layout.backend_app_dir)
                .join(".env")
                .display()
                .to_string(),
        }
        .into());
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

/// Synthesize every env file for one workspace.
///
/// Copies byte-for-byte, then applies role overrides in place. Output is
/// identical across repeated runs except for the explicitly governed keys.
///
/// # Errors
///
/// Fails on discovery failure, on an unreadable required source file, or
/// on a write failure. Optional-file read failures become warnings.
pub async fn synthesize<R: CommandRunner>(
    runner: &R,
    layout: &Layout,
    agent: &str,
    display_name: &str,
    alloc: &Allocation,
    source_root: &Path,
    target_root: &Path,
    policy: OverwritePolicy,
) -> Result<SynthesisOutcome> {
    let descriptors = discover(source_root, layout)?;
    let ctx = OverrideContext {
        agent,
        display_name,
        backend_port: alloc.backend_port,
        database_name: &alloc.database_name,
    };

    let mut outcome = SynthesisOutcome::default();
    if !descriptors.iter().any(|d| d.role == Role::Frontend) {
        outcome.warnings.push(format!(
            "no frontend env file under {}/ — frontend will run with defaults",
            layout.frontend_dir
        ));
    }
    if !descriptors.iter().any(|d| d.role == Role::MetaConfig) {
        outcome.warnings.push(format!(
            "no meta-config env file at {} — workspace identity keys not synthesized",
            layout.docker_env_path
        ));
    }

    for descriptor in descriptors {
        let target = target_root.join(&descriptor.relative_path);

        if target.exists() && is_tracked(runner, target_root, &descriptor.relative_path).await {
            let allowed = match policy {
                OverwritePolicy::Force => true,
                OverwritePolicy::Skip => false,
                OverwritePolicy::Prompt => confirm_overwrite(&target)?,
            };
            if !allowed {
                outcome.warnings.push(format!(
                    "skipped {}: tracked by version control (re-run with --yes to overwrite)",
                    descriptor.relative_path.display()
                ));
                outcome.files.push((descriptor, SynthAction::SkippedTracked));
                continue;
            }
            outcome.warnings.push(format!(
                "overwrote tracked file {}",
                descriptor.relative_path.display()
            ));
        }

        let bytes = match std::fs::read(&descriptor.source_path) {
            Ok(bytes) => bytes,
            Err(e) if descriptor.required => {
                return Err(e).with_context(|| {
                    format!(
                        "reading required env template {}",
                        descriptor.source_path.display()
                    )
                });
            }
            Err(e) => {
                outcome.warnings.push(format!(
                    "skipped optional {}: {e}",
                    descriptor.relative_path.display()
                ));
                continue;
            }
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        if descriptor.role == Role::Opaque {
            std::fs::write(&target, &bytes)
                .with_context(|| format!("writing {}", target.display()))?;
        } else {
            let content = String::from_utf8_lossy(&bytes);
            let rewritten = envfile::apply_overrides(&content, descriptor.role, &ctx);
            std::fs::write(&target, rewritten.as_bytes())
                .with_context(|| format!("writing {}", target.display()))?;
        }
        outcome.files.push((descriptor, SynthAction::Written));
    }

    Ok(outcome)
}

/// Whether the enclosing version-control system tracks `relative_path`.
/// Any git failure (not a repo, git absent) counts as untracked.
async fn is_tracked<R: CommandRunner>(runner: &R, root: &Path, relative_path: &Path) -> bool {
    let rel = relative_path.to_string_lossy();
    runner
        .run_in_dir("git", &["ls-files", "--error-unmatch", rel.as_ref()], root)
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn confirm_overwrite(target: &Path) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "{} is tracked by version control. Overwrite?",
            target.display()
        ))
        .default(false)
        .interact()
        .context("reading overwrite confirmation")
}

// ── Unit tests ───────────────────────────────────────────────────────────────
