//! End-to-end workspace operations: create, sync, delete.
//!
//! Each operation is an ordered sequence of steps over the lower layers
//! (git worktrees, env synthesis, database provisioning, services). Steps
//! are reported through [`Progress`] so the CLI can render spinners while
//! tests observe nothing.

use std::path::Path;

use anyhow::{Context, Result};

use crate::allocator::{self, Allocation};
use crate::command_runner::CommandRunner;
use crate::config::{MAIN_WORKSPACE, Registry, capitalize};
use crate::database::DbAdmin;
use crate::docker::Docker;
use crate::git;
use crate::health::{self, HealthReport};
use crate::probe::ResourceProbe;
use crate::services::{ServiceController, ServiceKind, StartReport};
use crate::synth::{self, OverwritePolicy, SynthesisOutcome};
use crate::workspace::{WORKSPACES_DIR, WorkspaceLock, WorkspacePaths};

/// Step-by-step reporting hook for long operations.
pub trait Progress {
    fn step(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Reporter that discards everything (tests, `--quiet`).
pub struct NullProgress;

impl Progress for NullProgress {
    fn step(&self, _: &str) {}
    fn warn(&self, _: &str) {}
}

/// Options for [`Lifecycle::create`].
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    pub policy: OverwritePolicy,
    /// Run migrations against the new database.
    pub migrate: bool,
    /// Bring the service stack up after provisioning.
    pub start_services: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            policy: OverwritePolicy::Skip,
            migrate: true,
            start_services: true,
        }
    }
}

/// What `create` did.
#[derive(Debug)]
pub struct CreateReport {
    pub allocation: Allocation,
    pub synthesis: SynthesisOutcome,
    pub database_created: bool,
    pub started: Vec<(ServiceKind, StartReport)>,
    pub health: Option<HealthReport>,
}

/// What `sync` did.
#[derive(Debug)]
pub struct SyncReport {
    pub pulled: bool,
    pub synthesis: SynthesisOutcome,
    pub migrated: bool,
}

/// Orchestrates workspace operations against one project.
pub struct Lifecycle<'a, R: CommandRunner, D: Docker> {
    runner: &'a R,
    docker: &'a D,
    registry: &'a Registry,
    project_root: &'a Path,
}

impl<'a, R: CommandRunner, D: Docker> Lifecycle<'a, R, D> {
    pub fn new(
        runner: &'a R,
        docker: &'a D,
        registry: &'a Registry,
        project_root: &'a Path,
    ) -> Self {
        Self {
            runner,
            docker,
            registry,
            project_root,
        }
    }

    /// Resolve `agent` to its allocation and workspace paths, validating
    /// the registry first.
    ///
    /// # Errors
    ///
    /// Fails on registry violations, allocation conflicts, or an unknown
    /// agent name.
    pub fn resolve_workspace(&self, agent: &str) -> Result<(Allocation, WorkspacePaths)> {
        self.registry.validate()?;
        allocator::validate_allocations(self.registry)?;
        let alloc = allocator::resolve(self.registry, agent)?;
        let paths = WorkspacePaths::new(self.project_root, agent);
        Ok((alloc, paths))
    }

    fn display_name(&self, agent: &str) -> String {
        self.registry
            .agent(agent)
            .map_or_else(|| capitalize(agent), |(_, def)| def.display_name())
    }

    fn controller<'s>(
        &'s self,
        agent: &'s str,
        alloc: &'s Allocation,
        paths: &WorkspacePaths,
    ) -> ServiceController<'s, R, D> {
        ServiceController::new(
            self.runner,
            self.docker,
            &self.registry.project,
            agent,
            alloc,
            paths.clone(),
        )
    }

    /// Provision a new workspace end to end.
    ///
    /// # Errors
    ///
    /// Fails on the first unrecoverable step; completed steps are left in
    /// place so a re-run resumes idempotently.
    pub async fn create(
        &self,
        agent: &str,
        opts: CreateOptions,
        progress: &dyn Progress,
    ) -> Result<CreateReport> {
        if agent == MAIN_WORKSPACE {
            anyhow::bail!("'main' is the source tree itself; it is never created");
        }
        let (alloc, paths) = self.resolve_workspace(agent)?;

        progress.step("creating git worktree");
        std::fs::create_dir_all(self.project_root.join(WORKSPACES_DIR))
            .context("creating workspaces directory")?;
        git::worktree_add(
            self.runner,
            self.project_root,
            paths.root(),
            &git::agent_branch(agent),
        )
        .await?;

        // Locked only after the worktree exists: the lock file lives
        // inside the workspace.
        let _lock = WorkspaceLock::acquire(&paths)?;

        progress.step("synthesizing env files");
        let synthesis = synth::synthesize(
            self.runner,
            &self.registry.project.layout,
            agent,
            &self.display_name(agent),
            &alloc,
            self.project_root,
            paths.root(),
            opts.policy,
        )
        .await?;
        for warning in &synthesis.warnings {
            progress.warn(warning);
        }

        progress.step("provisioning database");
        let admin = DbAdmin::new(self.runner, self.docker, &self.registry.project.infrastructure);
        let database_created = admin.create_database(&alloc.database_name).await?;
        if database_created {
            let schemas = &self.registry.project.infrastructure.shared_schemas;
            if !schemas.is_empty() {
                progress.step("copying shared schemas");
                admin
                    .copy_schemas(&self.registry.project.name, &alloc.database_name, schemas)
                    .await?;
            }
        } else {
            progress.warn(&format!(
                "database {} already exists; leaving its data untouched",
                alloc.database_name
            ));
        }
        if opts.migrate {
            progress.step("running migrations");
            admin
                .run_migrations(&paths.backend_project_dir(&self.registry.project.layout))
                .await?;
        }

        let mut started = Vec::new();
        let mut health_report = None;
        if opts.start_services {
            let controller = self.controller(agent, &alloc, &paths);
            for kind in self.present_services(&paths) {
                progress.step(&format!("starting {kind}"));
                let report = controller.start(kind).await?;
                for pid in &report.preempted {
                    progress.warn(&format!("preempted stale pid {pid} on {kind} port"));
                }
                started.push((kind, report));
            }

            progress.step("checking health");
            let probe =
                ResourceProbe::new(self.runner, self.docker, &self.registry.project.infrastructure);
            let report =
                health::check(&probe, &self.registry.project.layout, &paths, &alloc).await?;
            if !report.is_healthy() {
                progress.warn("workspace came up unhealthy; see `warren health`");
            }
            health_report = Some(report);
        }

        Ok(CreateReport {
            allocation: alloc,
            synthesis,
            database_created,
            started,
            health: health_report,
        })
    }

    /// Refresh an existing workspace: optionally pull, re-synthesize env
    /// files, optionally migrate.
    ///
    /// # Errors
    ///
    /// Fails when the workspace does not exist or a step fails.
    pub async fn sync(
        &self,
        agent: &str,
        pull: bool,
        migrate: bool,
        policy: OverwritePolicy,
        progress: &dyn Progress,
    ) -> Result<SyncReport> {
        let (alloc, paths) = self.resolve_workspace(agent)?;
        if !paths.exists() {
            anyhow::bail!(
                "workspace '{agent}' does not exist; run `warren create {agent}` first"
            );
        }
        let _lock = WorkspaceLock::acquire(&paths)?;

        if pull {
            progress.step("pulling latest changes");
            git::stash_and_pull(self.runner, paths.root()).await?;
        }

        progress.step("re-synthesizing env files");
        let synthesis = synth::synthesize(
            self.runner,
            &self.registry.project.layout,
            agent,
            &self.display_name(agent),
            &alloc,
            self.project_root,
            paths.root(),
            policy,
        )
        .await?;
        for warning in &synthesis.warnings {
            progress.warn(warning);
        }

        if migrate {
            progress.step("running migrations");
            let admin =
                DbAdmin::new(self.runner, self.docker, &self.registry.project.infrastructure);
            admin
                .run_migrations(&paths.backend_project_dir(&self.registry.project.layout))
                .await?;
        }

        Ok(SyncReport {
            pulled: pull,
            synthesis,
            migrated: migrate,
        })
    }

    /// Tear a workspace down: stop services, drop the database (unless
    /// kept), remove the worktree and directory.
    ///
    /// # Errors
    ///
    /// Fails when a teardown step fails; already-absent resources are
    /// tolerated.
    pub async fn delete(
        &self,
        agent: &str,
        keep_database: bool,
        progress: &dyn Progress,
    ) -> Result<()> {
        if agent == MAIN_WORKSPACE {
            anyhow::bail!("refusing to delete the main workspace (it is the source tree)");
        }
        let (alloc, paths) = self.resolve_workspace(agent)?;

        // Held through service teardown and the database drop; released
        // before the directory (and the lock file with it) is removed.
        let mut lock = None;
        if paths.exists() {
            lock = Some(WorkspaceLock::acquire(&paths)?);
            let controller = self.controller(agent, &alloc, &paths);
            for kind in ServiceKind::ALL {
                progress.step(&format!("stopping {kind}"));
                controller.stop(kind).await?;
            }
        }

        if keep_database {
            progress.warn(&format!("keeping database {}", alloc.database_name));
        } else {
            progress.step(&format!("dropping database {}", alloc.database_name));
            let admin =
                DbAdmin::new(self.runner, self.docker, &self.registry.project.infrastructure);
            admin.drop_database(&alloc.database_name).await?;
        }

        progress.step("removing git worktree");
        drop(lock);
        git::worktree_remove(self.runner, self.project_root, paths.root()).await?;
        if paths.exists() {
            std::fs::remove_dir_all(paths.root())
                .with_context(|| format!("removing {}", paths.root().display()))?;
        }
        Ok(())
    }

    /// The service kinds this workspace actually runs: frontend only when
    /// the directory exists, worker only when the compose file does.
    #[must_use]
    pub fn present_services(&self, paths: &WorkspacePaths) -> Vec<ServiceKind> {
        let mut kinds = vec![ServiceKind::Backend];
        if paths
            .root()
            .join(&self.registry.project.commands.worker_compose_file)
            .exists()
        {
            kinds.push(ServiceKind::Worker);
        }
        if paths.has_frontend(&self.registry.project.layout) {
            kinds.push(ServiceKind::Frontend);
        }
        kinds
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::AgentDefinition;
    use crate::probe::tests::{ScriptedDocker, ScriptedRunner, output};
    use tempfile::TempDir;

    fn registry() -> Registry {
        // Explicit ports: a formula-computed agent at index 0 would claim
        // main's base ports and fail allocation validation.
        let mut registry = Registry::fallback(Path::new("/tmp/themes"));
        registry.agents.push(AgentDefinition {
            name: "blue".to_string(),
            display_name: None,
            backend_port: Some(6899),
            frontend_port: Some(3099),
            chrome_debug_port: Some(9322),
            database_name: None,
        });
        registry
    }

    #[tokio::test]
    async fn test_create_rejects_main() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let err = lifecycle
            .create("main", CreateOptions::default(), &NullProgress)
            .await
            .expect_err("main is not creatable");
        assert!(err.to_string().contains("source tree"), "got: {err}");
    }

    #[tokio::test]
    async fn test_delete_rejects_main() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let err = lifecycle
            .delete("main", false, &NullProgress)
            .await
            .expect_err("main is not deletable");
        assert!(err.to_string().contains("refusing"), "got: {err}");
    }

    #[tokio::test]
    async fn test_sync_requires_existing_workspace() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let err = lifecycle
            .sync("blue", false, false, OverwritePolicy::Skip, &NullProgress)
            .await
            .expect_err("workspace missing");
        assert!(err.to_string().contains("does not exist"), "got: {err}");
    }

    #[tokio::test]
    async fn test_delete_keep_database_skips_drop() {
        // No workspace directory, keep-database: the only external call
        // is the worktree remove, which the runner answers successfully.
        // The docker double would panic if the drop were attempted.
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        lifecycle
            .delete("blue", true, &NullProgress)
            .await
            .expect("delete tolerates absent workspace");
    }

    #[tokio::test]
    async fn test_delete_waits_for_workspace_lock() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("workspaces/blue")).expect("mkdir");
        let paths = WorkspacePaths::new(dir.path(), "blue");
        let _held = WorkspaceLock::acquire(&paths).expect("hold lock");

        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let err = lifecycle
            .delete("blue", true, &NullProgress)
            .await
            .expect_err("lock is held");
        assert!(
            err.to_string().contains("another warren operation"),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn test_delete_drops_database_by_default() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![
            output(true, "themes-postgres-1\n", ""), // ps
            output(true, "DROP DATABASE\n", ""),     // drop
        ]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        lifecycle
            .delete("blue", false, &NullProgress)
            .await
            .expect("delete drops database");
        assert!(docker.responses.borrow().is_empty(), "drop was issued");
    }

    #[test]
    fn test_present_services_minimal_project() {
        let dir = TempDir::new().expect("tempdir");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let paths = WorkspacePaths::new(dir.path(), "main");
        // No compose file, no frontend directory: backend only.
        assert_eq!(lifecycle.present_services(&paths), vec![ServiceKind::Backend]);
    }

    #[test]
    fn test_present_services_full_project() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("docker-compose.worker.yml"), "services: {}\n")
            .expect("compose");
        std::fs::create_dir_all(dir.path().join("frontend")).expect("frontend");
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let docker = ScriptedDocker::new(vec![]);
        let registry = registry();
        let lifecycle = Lifecycle::new(&runner, &docker, &registry, dir.path());
        let paths = WorkspacePaths::new(dir.path(), "main");
        assert_eq!(
            lifecycle.present_services(&paths),
            vec![ServiceKind::Backend, ServiceKind::Worker, ServiceKind::Frontend]
        );
    }
}
