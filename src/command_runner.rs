//! Generic external-command execution with timeout and guaranteed kill.
//!
//! Every external tool warren touches (docker, psql via docker exec, git,
//! lsof, alembic, npm) goes through [`CommandRunner`], so tests can
//! substitute canned results without spawning processes.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Default timeout for short administrative commands (docker inspect,
/// lsof, git worktree, psql one-liners).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for heavyweight commands (schema copy, migrations, compose up).
pub const LONG_CMD_TIMEOUT: Duration = Duration::from_secs(180);

/// Description of a long-lived service process to launch detached from the
/// CLI: working directory, environment overrides, and a log file that
/// receives both stdout and stderr.
pub struct ServiceSpec<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    pub env: Vec<(String, String)>,
    pub log_file: &'a Path,
}

/// Command execution abstraction.
///
/// The production implementation uses tokio with an explicit kill on
/// timeout; test doubles return canned [`Output`]s.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with the default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a command with a custom timeout.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Run a command with its working directory set to `dir` (migration
    /// tools and frontend tooling resolve paths relative to their project).
    async fn run_in_dir(&self, program: &str, args: &[&str], dir: &Path) -> Result<Output>;

    /// Run a command with stdin piped from `input` (schema restore).
    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output>;

    /// Launch a long-lived service detached from the CLI and return its pid.
    ///
    /// The child intentionally outlives this process; it is reaped later by
    /// `stop` or by stale-port preemption on the next `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened or the process
    /// fails to spawn.
    fn spawn_service(&self, spec: &ServiceSpec<'_>) -> Result<u32>;
}

/// Production `CommandRunner` backed by tokio.
///
/// A plain `tokio::time::timeout` around `.output().await` does not kill
/// the child when the timeout fires; the future is dropped but the OS
/// process keeps running. `tokio::select!` with an explicit `child.kill()`
/// guarantees termination on every platform.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn execute(
        mut cmd: tokio::process::Command,
        program: &str,
        timeout: Duration,
        input: Option<&[u8]>,
    ) -> Result<Output> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if input.is_some() {
            cmd.stdin(Stdio::piped());
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        if let Some(bytes) = input {
            // Feed stdin from a separate task so a full pipe cannot wedge
            // the wait/read loop below.
            let stdin = child.stdin.take();
            let owned = bytes.to_vec();
            tokio::spawn(async move {
                if let Some(mut stdin) = stdin {
                    use tokio::io::AsyncWriteExt;
                    let _ = stdin.write_all(&owned).await;
                }
            });
        }

        let mut out_pipe = child.stdout.take();
        let mut err_pipe = child.stderr.take();

        // Drain stdout/stderr concurrently with wait(): a child writing more
        // than the OS pipe buffer blocks on write, and waiting first would
        // deadlock against it.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut pipe) = out_pipe {
                            let _ = pipe.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut pipe) = err_pipe {
                            let _ = pipe.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        Self::execute(cmd, program, timeout, None).await
    }

    async fn run_in_dir(&self, program: &str, args: &[&str], dir: &Path) -> Result<Output> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).current_dir(dir);
        Self::execute(cmd, program, self.timeout, None).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        Self::execute(cmd, program, self.timeout, Some(input)).await
    }

    fn spawn_service(&self, spec: &ServiceSpec<'_>) -> Result<u32> {
        if let Some(parent) = spec.log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(spec.log_file)
            .with_context(|| format!("opening log file {}", spec.log_file.display()))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("cloning log handle {}", spec.log_file.display()))?;

        let mut cmd = std::process::Command::new(spec.program);
        cmd.args(&spec.args)
            .current_dir(spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", spec.program))?;
        Ok(child.id())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn runner() -> TokioCommandRunner {
        TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT)
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = runner().run("echo", &["hello"]).await.expect("echo runs");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_missing_program_is_error() {
        let err = runner()
            .run("warren-no-such-binary", &[])
            .await
            .expect_err("spawn should fail");
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_run_with_timeout_kills_slow_command() {
        let err = runner()
            .run_with_timeout("sleep", &["30"], Duration::from_millis(100))
            .await
            .expect_err("should time out");
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn test_run_with_stdin_pipes_input() {
        let out = runner()
            .run_with_stdin("cat", &[], b"piped bytes")
            .await
            .expect("cat runs");
        assert_eq!(out.stdout, b"piped bytes");
    }

    #[tokio::test]
    async fn test_run_in_dir_sets_working_directory() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let out = runner()
            .run_in_dir("pwd", &[], dir.path())
            .await
            .expect("pwd runs");
        let printed = String::from_utf8_lossy(&out.stdout);
        let canon = dir.path().canonicalize().expect("canonicalize");
        assert_eq!(printed.trim(), canon.to_string_lossy());
    }

    #[tokio::test]
    async fn test_spawn_service_writes_pid_and_log() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let log = dir.path().join("logs").join("svc.log");
        let pid = runner()
            .spawn_service(&ServiceSpec {
                program: "sh",
                args: vec!["-c".into(), "echo started".into()],
                cwd: dir.path(),
                env: vec![],
                log_file: &log,
            })
            .expect("spawn");
        assert!(pid > 0);
        // Give the child a moment to write and exit.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let content = std::fs::read_to_string(&log).expect("log exists");
        assert!(content.contains("started"));
    }
}
