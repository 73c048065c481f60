//! Docker CLI abstraction — enables test doubles for all `docker` commands.
//!
//! The engine never manages image builds; it only starts, stops, and
//! inspects named containers plus a compose-scoped worker stack.

use std::path::Path;
use std::process::Output;

use anyhow::Result;

use crate::command_runner::{CommandRunner, LONG_CMD_TIMEOUT};

/// Abstraction over the docker CLI.
///
/// The production implementation delegates to the `docker` binary through
/// a [`CommandRunner`]; tests substitute canned outputs.
#[allow(async_fn_in_trait)]
pub trait Docker {
    /// Run `docker inspect -f '{{.State.Status}}' <container>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn inspect_state(&self, container: &str) -> Result<Output>;

    /// Run `docker ps --filter name=<pattern> --format '{{.Names}}'`
    /// (running containers only).
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn ps_names(&self, pattern: &str) -> Result<Output>;

    /// Run `docker compose -p <project> -f <file> up -d` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn compose_up(&self, dir: &Path, compose_file: &str, project: &str) -> Result<Output>;

    /// Run `docker compose -p <project> -f <file> stop` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn compose_stop(&self, dir: &Path, compose_file: &str, project: &str) -> Result<Output>;

    /// Run `docker exec <container> <args…>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn exec(&self, container: &str, args: &[&str]) -> Result<Output>;

    /// Run `docker exec -i <container> <args…>` with stdin from `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    async fn exec_with_stdin(&self, container: &str, args: &[&str], input: &[u8])
    -> Result<Output>;
}

/// Production [`Docker`] — shells out to the `docker` binary.
pub struct DockerCli<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> DockerCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> Docker for DockerCli<R> {
    async fn inspect_state(&self, container: &str) -> Result<Output> {
        self.runner
            .run("docker", &["inspect", "-f", "{{.State.Status}}", container])
            .await
    }

    async fn ps_names(&self, pattern: &str) -> Result<Output> {
        let filter = format!("name={pattern}");
        self.runner
            .run("docker", &["ps", "--filter", &filter, "--format", "{{.Names}}"])
            .await
    }

    async fn compose_up(&self, dir: &Path, compose_file: &str, project: &str) -> Result<Output> {
        // Compose may pull images on first bring-up; long timeout. The
        // project directory is passed as a flag so relative paths in the
        // compose file resolve against the workspace.
        let dir = dir.to_string_lossy();
        self.runner
            .run_with_timeout(
                "docker",
                &[
                    "compose",
                    "--project-directory",
                    dir.as_ref(),
                    "-p",
                    project,
                    "-f",
                    compose_file,
                    "up",
                    "-d",
                ],
                LONG_CMD_TIMEOUT,
            )
            .await
    }

    async fn compose_stop(&self, dir: &Path, compose_file: &str, project: &str) -> Result<Output> {
        let dir = dir.to_string_lossy();
        self.runner
            .run(
                "docker",
                &[
                    "compose",
                    "--project-directory",
                    dir.as_ref(),
                    "-p",
                    project,
                    "-f",
                    compose_file,
                    "stop",
                ],
            )
            .await
    }

    async fn exec(&self, container: &str, args: &[&str]) -> Result<Output> {
        let mut full = vec!["exec", container];
        full.extend_from_slice(args);
        self.runner.run("docker", &full).await
    }

    async fn exec_with_stdin(
        &self,
        container: &str,
        args: &[&str],
        input: &[u8],
    ) -> Result<Output> {
        let mut full = vec!["exec", "-i", container];
        full.extend_from_slice(args);
        self.runner.run_with_stdin("docker", &full, input).await
    }
}

/// First container name from `docker ps` output, if any.
#[must_use]
pub fn first_name(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Parse `docker inspect -f '{{.State.Status}}'` output.
#[must_use]
pub fn parse_state(stdout: &[u8]) -> Option<String> {
    let state = String::from_utf8_lossy(stdout).trim().to_string();
    if state.is_empty() { None } else { Some(state) }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_name_picks_first_nonempty_line() {
        assert_eq!(
            first_name(b"\nthemes-postgres-1\nother\n"),
            Some("themes-postgres-1".to_string())
        );
    }

    #[test]
    fn test_first_name_empty_output_is_none() {
        assert_eq!(first_name(b""), None);
        assert_eq!(first_name(b"\n\n"), None);
    }

    #[test]
    fn test_parse_state_trims_newline() {
        assert_eq!(parse_state(b"running\n"), Some("running".to_string()));
        assert_eq!(parse_state(b"exited\n"), Some("exited".to_string()));
    }

    #[test]
    fn test_parse_state_empty_is_none() {
        assert_eq!(parse_state(b"\n"), None);
    }
}
