//! Database provisioning through the shared postgres container.
//!
//! All SQL runs via `docker exec` against the container matched by the
//! configured name pattern; warren never opens a database connection of
//! its own. Schema migrations are delegated to the project's own
//! migration tool inside the workspace.

use std::path::Path;

use anyhow::{Context, Result};

use crate::command_runner::CommandRunner;
use crate::config::Infrastructure;
use crate::docker::Docker;
use crate::errors::ResourceUnavailable;
use crate::probe::{DatabaseStatus, ResourceProbe};

/// Creates, copies into, and drops per-agent databases.
pub struct DbAdmin<'a, R: CommandRunner, D: Docker> {
    runner: &'a R,
    docker: &'a D,
    infra: &'a Infrastructure,
}

impl<'a, R: CommandRunner, D: Docker> DbAdmin<'a, R, D> {
    pub fn new(runner: &'a R, docker: &'a D, infra: &'a Infrastructure) -> Self {
        Self {
            runner,
            docker,
            infra,
        }
    }

    fn probe(&self) -> ResourceProbe<'a, R, D> {
        ResourceProbe::new(self.runner, self.docker, self.infra)
    }

    /// Create the database `name` if it does not exist.
    ///
    /// Returns `true` when the database was created, `false` when it
    /// already existed (existing data is never touched).
    ///
    /// # Errors
    ///
    /// Fails when the database container is unreachable or the CREATE
    /// statement fails.
    pub async fn create_database(&self, name: &str) -> Result<bool> {
        let probe = self.probe();
        if probe.database_status(name).await? != DatabaseStatus::NotFound {
            return Ok(false);
        }

        let container = probe.db_container().await?;
        let sql = format!("CREATE DATABASE {}", quote_ident(name));
        let out = self
            .docker
            .exec(&container, &["psql", "-U", "postgres", "-c", &sql])
            .await
            .context("creating database")?;
        if !out.status.success() {
            return Err(ResourceUnavailable {
                what: "database server",
                detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
                hint: format!("check the {container} container logs"),
            }
            .into());
        }
        Ok(true)
    }

    /// Drop the database `name`, disconnecting active sessions. A missing
    /// database is not an error.
    ///
    /// # Errors
    ///
    /// Fails when the database container is unreachable or the DROP
    /// statement fails for a reason other than the database not existing.
    pub async fn drop_database(&self, name: &str) -> Result<()> {
        let container = self.probe().db_container().await?;
        let sql = format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", quote_ident(name));
        let out = self
            .docker
            .exec(&container, &["psql", "-U", "postgres", "-c", &sql])
            .await
            .context("dropping database")?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("dropping database {name} failed: {}", stderr.trim());
        }
        Ok(())
    }

    /// Copy the configured shared schemas from `source_db` into
    /// `target_db` via `pg_dump | psql` inside the container.
    ///
    /// # Errors
    ///
    /// Fails when a dump or restore step fails for any schema.
    pub async fn copy_schemas(
        &self,
        source_db: &str,
        target_db: &str,
        schemas: &[String],
    ) -> Result<()> {
        if schemas.is_empty() {
            return Ok(());
        }
        let container = self.probe().db_container().await?;
        for schema in schemas {
            let dump = self
                .docker
                .exec(
                    &container,
                    &["pg_dump", "-U", "postgres", "-d", source_db, "-n", schema],
                )
                .await
                .with_context(|| format!("dumping schema {schema} from {source_db}"))?;
            if !dump.status.success() {
                let stderr = String::from_utf8_lossy(&dump.stderr);
                anyhow::bail!("pg_dump of schema {schema} failed: {}", stderr.trim());
            }

            let restore = self
                .docker
                .exec_with_stdin(
                    &container,
                    &[
                        "psql",
                        "-U",
                        "postgres",
                        "-d",
                        target_db,
                        "-v",
                        "ON_ERROR_STOP=1",
                    ],
                    &dump.stdout,
                )
                .await
                .with_context(|| format!("restoring schema {schema} into {target_db}"))?;
            if !restore.status.success() {
                let stderr = String::from_utf8_lossy(&restore.stderr);
                anyhow::bail!("restore of schema {schema} failed: {}", stderr.trim());
            }
        }
        Ok(())
    }

    /// Run the project's migrations inside the workspace backend
    /// directory. The backend env file there already points at the
    /// agent's database.
    ///
    /// # Errors
    ///
    /// Fails when the migration command exits non-zero or cannot be run.
    pub async fn run_migrations(&self, backend_dir: &Path) -> Result<()> {
        let out = self
            .runner
            .run_in_dir("alembic", &["upgrade", "head"], backend_dir)
            .await
            .context("running alembic (is it on PATH?)")?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("alembic upgrade head failed:\n{}", stderr.trim());
        }
        Ok(())
    }
}

/// Quote a SQL identifier, doubling embedded double quotes.
#[must_use]
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

// ── Unit tests ───────────────────────────────────────────────────────────────
