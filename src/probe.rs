//! Read-only resource probes: containers, ports, databases.
//!
//! Probes never mutate anything. Downstream logic branches differently on
//! every variant, so states are kept distinct rather than collapsed into
//! booleans (a database that exists with no migrations is not the same as
//! a missing one).

use anyhow::{Context, Result};

use crate::command_runner::CommandRunner;
use crate::config::Infrastructure;
use crate::docker::{self, Docker};
use crate::errors::ResourceUnavailable;

/// Observed state of a named container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// No container by that name exists.
    Absent,
    /// The container exists; `running` distinguishes live from exited.
    Present { running: bool },
    /// The runtime could not be queried.
    Error(String),
}

/// Observed state of a named database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// The database does not exist.
    NotFound,
    /// The database exists but no migrations have been applied.
    NoSchema,
    /// The database exists with this schema-version marker.
    SchemaVersion(String),
}

/// Read-only checks against the container runtime and database server.
pub struct ResourceProbe<'a, R: CommandRunner, D: Docker> {
    runner: &'a R,
    docker: &'a D,
    infra: &'a Infrastructure,
}

impl<'a, R: CommandRunner, D: Docker> ResourceProbe<'a, R, D> {
    pub fn new(runner: &'a R, docker: &'a D, infra: &'a Infrastructure) -> Self {
        Self {
            runner,
            docker,
            infra,
        }
    }

    /// State of the container named `name`.
    pub async fn container_status(&self, name: &str) -> ContainerStatus {
        match self.docker.inspect_state(name).await {
            Ok(out) if out.status.success() => match docker::parse_state(&out.stdout).as_deref() {
                Some("running") => ContainerStatus::Present { running: true },
                Some(_) => ContainerStatus::Present { running: false },
                None => ContainerStatus::Error("empty inspect output".to_string()),
            },
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                if stderr.contains("No such object") || stderr.contains("no such container") {
                    ContainerStatus::Absent
                } else {
                    ContainerStatus::Error(stderr.trim().to_string())
                }
            }
            Err(e) => ContainerStatus::Error(e.to_string()),
        }
    }

    /// Pid currently bound to `port`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if `lsof` cannot be spawned; a clean "nothing
    /// listening" is `Ok(None)`.
    pub async fn port_occupant(&self, port: u16) -> Result<Option<u32>> {
        let spec = format!("tcp:{port}");
        let out = self
            .runner
            .run("lsof", &["-ti", &spec, "-sTCP:LISTEN"])
            .await
            .context("running lsof (is it installed?)")?;
        // lsof exits non-zero when nothing matches.
        Ok(parse_first_pid(&out.stdout))
    }

    /// Locate the shared database container by the configured name pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceUnavailable`] when no matching container is
    /// running.
    pub async fn db_container(&self) -> Result<String> {
        let out = self
            .docker
            .ps_names(&self.infra.db_container_pattern)
            .await
            .context("listing containers")?;
        docker::first_name(&out.stdout).ok_or_else(|| {
            ResourceUnavailable {
                what: "database container",
                detail: format!(
                    "no running container matches '{}'",
                    self.infra.db_container_pattern
                ),
                hint: "start the shared infrastructure first (docker compose up -d)".to_string(),
            }
            .into()
        })
    }

    /// State of the database named `name`, via the shared db container.
    ///
    /// # Errors
    ///
    /// Returns an error when the database container is unreachable.
    pub async fn database_status(&self, name: &str) -> Result<DatabaseStatus> {
        let container = self.db_container().await?;

        let exists_sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = '{}'",
            quote_literal(name)
        );
        let out = self
            .docker
            .exec(&container, &["psql", "-U", "postgres", "-tA", "-c", &exists_sql])
            .await
            .context("querying pg_database")?;
        if !out.status.success() {
            return Err(ResourceUnavailable {
                what: "database server",
                detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
                hint: format!("check the {container} container logs"),
            }
            .into());
        }
        if String::from_utf8_lossy(&out.stdout).trim() != "1" {
            return Ok(DatabaseStatus::NotFound);
        }

        let out = self
            .docker
            .exec(
                &container,
                &[
                    "psql",
                    "-U",
                    "postgres",
                    "-d",
                    name,
                    "-tA",
                    "-c",
                    "SELECT version_num FROM alembic_version",
                ],
            )
            .await
            .context("querying schema version")?;
        if out.status.success() {
            let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if version.is_empty() {
                Ok(DatabaseStatus::NoSchema)
            } else {
                Ok(DatabaseStatus::SchemaVersion(version))
            }
        } else {
            // Relation absent means the database was created but never
            // migrated.
            Ok(DatabaseStatus::NoSchema)
        }
    }
}

/// First pid in `lsof -t` output (one pid per line).
#[must_use]
pub fn parse_first_pid(stdout: &[u8]) -> Option<u32> {
    String::from_utf8_lossy(stdout)
        .lines()
        .find_map(|l| l.trim().parse::<u32>().ok())
}

/// Escape a string for use inside a single-quoted SQL literal.
#[must_use]
pub fn quote_literal(s: &str) -> String {
    s.replace('\'', "''")
}

// ── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;
    use std::process::Output;
    use std::time::Duration;

    pub(crate) fn output(success: bool, stdout: &str, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(i32::from(!success) << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    /// Docker double returning queued responses in call order.
    pub(crate) struct ScriptedDocker {
        pub responses: RefCell<Vec<Output>>,
    }

    impl ScriptedDocker {
        pub fn new(responses: Vec<Output>) -> Self {
            Self {
                responses: RefCell::new(responses),
            }
        }

        fn next(&self) -> Output {
            let mut q = self.responses.borrow_mut();
            assert!(!q.is_empty(), "docker double ran out of responses");
            q.remove(0)
        }
    }

    impl Docker for ScriptedDocker {
        async fn inspect_state(&self, _: &str) -> Result<Output> {
            Ok(self.next())
        }
        async fn ps_names(&self, _: &str) -> Result<Output> {
            Ok(self.next())
        }
        async fn compose_up(&self, _: &Path, _: &str, _: &str) -> Result<Output> {
            Ok(self.next())
        }
        async fn compose_stop(&self, _: &Path, _: &str, _: &str) -> Result<Output> {
            Ok(self.next())
        }
        async fn exec(&self, _: &str, _: &[&str]) -> Result<Output> {
            Ok(self.next())
        }
        async fn exec_with_stdin(&self, _: &str, _: &[&str], _: &[u8]) -> Result<Output> {
            Ok(self.next())
        }
    }

    /// Runner double with one canned response for every call.
    pub(crate) struct ScriptedRunner {
        pub response: Output,
    }

    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _: &str, _: &[&str]) -> Result<Output> {
            Ok(self.response.clone())
        }
        async fn run_with_timeout(&self, p: &str, a: &[&str], _: Duration) -> Result<Output> {
            self.run(p, a).await
        }
        async fn run_in_dir(&self, p: &str, a: &[&str], _: &Path) -> Result<Output> {
            self.run(p, a).await
        }
        async fn run_with_stdin(&self, p: &str, a: &[&str], _: &[u8]) -> Result<Output> {
            self.run(p, a).await
        }
        fn spawn_service(&self, _: &crate::command_runner::ServiceSpec<'_>) -> Result<u32> {
            Ok(1)
        }
    }

    fn infra() -> Infrastructure {
        Infrastructure::default()
    }

    #[tokio::test]
    async fn test_container_status_running() {
        let docker = ScriptedDocker::new(vec![output(true, "running\n", "")]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(
            probe.container_status("c").await,
            ContainerStatus::Present { running: true }
        );
    }

    #[tokio::test]
    async fn test_container_status_exited_is_present_not_running() {
        let docker = ScriptedDocker::new(vec![output(true, "exited\n", "")]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(
            probe.container_status("c").await,
            ContainerStatus::Present { running: false }
        );
    }

    #[tokio::test]
    async fn test_container_status_absent() {
        let docker = ScriptedDocker::new(vec![output(
            false,
            "",
            "Error: No such object: themes-worker-blue",
        )]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(probe.container_status("c").await, ContainerStatus::Absent);
    }

    #[tokio::test]
    async fn test_port_occupant_parses_pid() {
        let docker = ScriptedDocker::new(vec![]);
        let runner = ScriptedRunner {
            response: output(true, "12345\n6789\n", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(probe.port_occupant(6799).await.expect("ok"), Some(12345));
    }

    #[tokio::test]
    async fn test_port_occupant_free_port_is_none() {
        let docker = ScriptedDocker::new(vec![]);
        let runner = ScriptedRunner {
            response: output(false, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(probe.port_occupant(6799).await.expect("ok"), None);
    }

    #[tokio::test]
    async fn test_database_status_not_found() {
        let docker = ScriptedDocker::new(vec![
            output(true, "themes-postgres-1\n", ""), // ps
            output(true, "\n", ""),                  // pg_database lookup
        ]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(
            probe.database_status("themes_blue").await.expect("ok"),
            DatabaseStatus::NotFound
        );
    }

    #[tokio::test]
    async fn test_database_status_no_schema_when_marker_table_missing() {
        let docker = ScriptedDocker::new(vec![
            output(true, "themes-postgres-1\n", ""),
            output(true, "1\n", ""),
            output(false, "", "ERROR: relation \"alembic_version\" does not exist"),
        ]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(
            probe.database_status("themes_blue").await.expect("ok"),
            DatabaseStatus::NoSchema
        );
    }

    #[tokio::test]
    async fn test_database_status_reports_schema_version() {
        let docker = ScriptedDocker::new(vec![
            output(true, "themes-postgres-1\n", ""),
            output(true, "1\n", ""),
            output(true, "a1b2c3d4e5f6\n", ""),
        ]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        assert_eq!(
            probe.database_status("themes_blue").await.expect("ok"),
            DatabaseStatus::SchemaVersion("a1b2c3d4e5f6".to_string())
        );
    }

    #[tokio::test]
    async fn test_db_container_missing_is_resource_unavailable() {
        let docker = ScriptedDocker::new(vec![output(true, "", "")]);
        let runner = ScriptedRunner {
            response: output(true, "", ""),
        };
        let infra = infra();
        let probe = ResourceProbe::new(&runner, &docker, &infra);
        let err = probe.db_container().await.expect_err("unavailable");
        assert!(err.to_string().contains("database container"), "got: {err}");
    }

    #[test]
    fn test_parse_first_pid_ignores_blank_lines() {
        assert_eq!(parse_first_pid(b"\n9876\n"), Some(9876));
        assert_eq!(parse_first_pid(b""), None);
    }

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("a'b"), "a''b");
    }
}
