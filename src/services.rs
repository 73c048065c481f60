//! Per-workspace service lifecycle: start, stop, restart, preemption.
//!
//! State machine per (workspace, service kind):
//! `Stopped → Starting → Running`, `Running → Stopping → Stopped`, and
//! `Starting|Running → Unhealthy` on probe failure. Records are persisted
//! under the workspace run directory and owned exclusively by this
//! controller for its workspace.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocator::Allocation;
use crate::command_runner::{CommandRunner, ServiceSpec};
use crate::config::ProjectConfig;
use crate::docker::{self, Docker};
use crate::errors::ServiceTimeout;
use crate::health;
use crate::probe::ResourceProbe;
use crate::workspace::WorkspacePaths;

/// Bound on waiting for a started service to become responsive.
pub const START_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on waiting for a process to exit after a graceful signal,
/// before escalating to a forced kill.
pub const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
/// Poll interval inside bounded wait loops.
pub const POLL_INTERVAL: Duration = Duration::from_millis(400);
/// Per-attempt HTTP timeout while polling readiness.
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Log lines surfaced when a service fails to come up.
pub const LOG_TAIL_LINES: usize = 20;

// ── State machine types ──────────────────────────────────────────────────────

/// The three services of one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Backend,
    Worker,
    Frontend,
}

impl ServiceKind {
    pub const ALL: [Self; 3] = [Self::Backend, Self::Worker, Self::Frontend];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Worker => "worker",
            Self::Frontend => "frontend",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "backend" => Ok(Self::Backend),
            "worker" => Ok(Self::Worker),
            "frontend" => Ok(Self::Frontend),
            other => anyhow::bail!("unknown service '{other}' (backend, worker, frontend)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Unhealthy,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Persisted handle for one service of one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub kind: ServiceKind,
    pub state: ServiceState,
    /// Host process id (backend/frontend).
    pub pid: Option<u32>,
    /// Compose project name (worker).
    pub container: Option<String>,
    pub port: Option<u16>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    #[must_use]
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            state: ServiceState::Stopped,
            pid: None,
            container: None,
            port: None,
            updated_at: Utc::now(),
        }
    }
}

// ── Record persistence ───────────────────────────────────────────────────────

/// JSON service records under `<workspace>/.warren/services/`.
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    #[must_use]
    pub fn for_workspace(paths: &WorkspacePaths) -> Self {
        Self {
            dir: paths.services_dir(),
        }
    }

    fn path(&self, kind: ServiceKind) -> PathBuf {
        self.dir.join(format!("{kind}.json"))
    }

    /// Load the record for `kind`, if one exists.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(&self, kind: ServiceKind) -> Result<Option<ServiceRecord>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading service record {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("parsing service record {}", path.display()))?;
        Ok(Some(record))
    }

    /// Persist `record`.
    ///
    /// # Errors
    ///
    /// Fails when the record directory or file cannot be written.
    pub fn save(&self, record: &ServiceRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path(record.kind);
        let content = serde_json::to_string_pretty(record).context("serializing record")?;
        std::fs::write(&path, content)
            .with_context(|| format!("writing service record {}", path.display()))?;
        Ok(())
    }

    /// Remove the record for `kind` if present.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be removed.
    pub fn clear(&self, kind: ServiceKind) -> Result<()> {
        let path = self.path(kind);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing service record {}", path.display()))?;
        }
        Ok(())
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Result of a start operation.
#[derive(Debug)]
pub struct StartReport {
    pub state: ServiceState,
    /// Pids of stale port occupants that had to be terminated. Surfaced
    /// as warnings, never as errors.
    pub preempted: Vec<u32>,
}

/// Starts, stops, and restarts the services of one workspace.
pub struct ServiceController<'a, R: CommandRunner, D: Docker> {
    runner: &'a R,
    docker: &'a D,
    project: &'a ProjectConfig,
    agent: &'a str,
    alloc: &'a Allocation,
    paths: WorkspacePaths,
    store: RecordStore,
    start_timeout: Duration,
}

impl<'a, R: CommandRunner, D: Docker> ServiceController<'a, R, D> {
    pub fn new(
        runner: &'a R,
        docker: &'a D,
        project: &'a ProjectConfig,
        agent: &'a str,
        alloc: &'a Allocation,
        paths: WorkspacePaths,
    ) -> Self {
        let store = RecordStore::for_workspace(&paths);
        Self {
            runner,
            docker,
            project,
            agent,
            alloc,
            paths,
            store,
            start_timeout: START_TIMEOUT,
        }
    }

    /// Override the readiness bound (used in tests).
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    #[must_use]
    pub fn record_store(&self) -> &RecordStore {
        &self.store
    }

    /// Compose project name scoping the worker stack to this workspace.
    #[must_use]
    pub fn compose_project(&self) -> String {
        format!("{}-{}", self.project.name, self.agent)
            .to_lowercase()
            .replace('_', "-")
    }

    fn probe(&self) -> ResourceProbe<'_, R, D> {
        ResourceProbe::new(self.runner, self.docker, &self.project.infrastructure)
    }

    fn log_file(&self, kind: ServiceKind) -> PathBuf {
        self.paths.logs_dir().join(format!("{kind}.log"))
    }

    /// Start one service, preempting any stale occupant of its port.
    ///
    /// # Errors
    ///
    /// Fails when the service cannot be launched, or with
    /// [`ServiceTimeout`] (record left `Unhealthy`) when it launches but
    /// never becomes responsive.
    pub async fn start(&self, kind: ServiceKind) -> Result<StartReport> {
        match kind {
            ServiceKind::Worker => self.start_worker().await,
            ServiceKind::Backend | ServiceKind::Frontend => self.start_process(kind).await,
        }
    }

    /// Stop one service. Idempotent: stopping a stopped or unknown
    /// service succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// Fails when the process refuses to die or the port stays occupied.
    pub async fn stop(&self, kind: ServiceKind) -> Result<()> {
        let Some(mut record) = self.store.load(kind)? else {
            return Ok(());
        };
        if record.state == ServiceState::Stopped {
            return Ok(());
        }
        record.state = ServiceState::Stopping;
        record.updated_at = Utc::now();
        self.store.save(&record)?;

        match kind {
            ServiceKind::Worker => {
                let out = self
                    .docker
                    .compose_stop(
                        self.paths.root(),
                        &self.project.commands.worker_compose_file,
                        &self.compose_project(),
                    )
                    .await
                    .context("stopping worker containers")?;
                if !out.status.success() {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    anyhow::bail!("docker compose stop failed: {}", stderr.trim());
                }
            }
            ServiceKind::Backend | ServiceKind::Frontend => {
                if let Some(pid) = record.pid {
                    self.terminate_pid(pid).await?;
                }
                if let Some(port) = record.port {
                    if let Some(holder) = self.probe().port_occupant(port).await? {
                        anyhow::bail!(
                            "port {port} still occupied by pid {holder} after stopping {kind}"
                        );
                    }
                }
            }
        }

        record.state = ServiceState::Stopped;
        record.pid = None;
        record.updated_at = Utc::now();
        self.store.save(&record)?;
        Ok(())
    }

    /// Stop then start.
    ///
    /// # Errors
    ///
    /// Propagates errors from either phase.
    pub async fn restart(&self, kind: ServiceKind) -> Result<StartReport> {
        self.stop(kind).await?;
        self.start(kind).await
    }

    async fn start_worker(&self) -> Result<StartReport> {
        let compose_file = &self.project.commands.worker_compose_file;
        let compose_path = self.paths.root().join(compose_file);
        if !compose_path.exists() {
            anyhow::bail!(
                "worker compose file missing: {}\nAdd it or remove the worker from this project.",
                compose_path.display()
            );
        }

        let project = self.compose_project();
        let mut record = ServiceRecord::new(ServiceKind::Worker);
        record.state = ServiceState::Starting;
        record.container = Some(project.clone());
        self.store.save(&record)?;

        let out = self
            .docker
            .compose_up(self.paths.root(), compose_file, &project)
            .await
            .context("starting worker containers")?;
        if !out.status.success() {
            record.state = ServiceState::Unhealthy;
            record.updated_at = Utc::now();
            self.store.save(&record)?;
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("docker compose up failed: {}", stderr.trim());
        }

        // Container-backed service: probe via container status, not pid.
        let deadline = tokio::time::Instant::now() + self.start_timeout;
        loop {
            let out = self.docker.ps_names(&project).await?;
            if docker::first_name(&out.stdout).is_some() {
                record.state = ServiceState::Running;
                record.updated_at = Utc::now();
                self.store.save(&record)?;
                return Ok(StartReport {
                    state: ServiceState::Running,
                    preempted: Vec::new(),
                });
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        record.state = ServiceState::Unhealthy;
        record.updated_at = Utc::now();
        self.store.save(&record)?;
        Err(ServiceTimeout {
            service: ServiceKind::Worker.to_string(),
            seconds: self.start_timeout.as_secs(),
            log_tail: Vec::new(),
        }
        .into())
    }

    async fn start_process(&self, kind: ServiceKind) -> Result<StartReport> {
        let port = match kind {
            ServiceKind::Backend => self.alloc.backend_port,
            ServiceKind::Frontend => self.alloc.frontend_port,
            ServiceKind::Worker => unreachable!("worker is container-backed"),
        };

        // Prior runs may have left an orphaned process on the port.
        let preempted = self.preempt_port(port).await?;

        let template = match kind {
            ServiceKind::Backend => &self.project.commands.backend,
            ServiceKind::Frontend => &self.project.commands.frontend,
            ServiceKind::Worker => unreachable!(),
        };
        let (program, args) = split_command(template, port);
        let cwd = match kind {
            ServiceKind::Backend => self.paths.backend_project_dir(&self.project.layout),
            ServiceKind::Frontend => self.paths.frontend_dir(&self.project.layout),
            ServiceKind::Worker => unreachable!(),
        };

        let mut record = ServiceRecord::new(kind);
        record.state = ServiceState::Starting;
        record.port = Some(port);
        self.store.save(&record)?;

        let log_file = self.log_file(kind);
        let pid = self.runner.spawn_service(&ServiceSpec {
            program: &program,
            args,
            cwd: &cwd,
            env: vec![("AGENT_COLOR".to_string(), self.agent.to_string())],
            log_file: &log_file,
        })?;
        record.pid = Some(pid);
        record.updated_at = Utc::now();
        self.store.save(&record)?;

        let ready_url = match kind {
            ServiceKind::Backend => format!(
                "http://127.0.0.1:{port}{}",
                health::BACKEND_HEALTH_PATH
            ),
            _ => format!("http://127.0.0.1:{port}/"),
        };

        let deadline = tokio::time::Instant::now() + self.start_timeout;
        loop {
            if !self.pid_alive(pid).await {
                // Process died during startup: surface its last words.
                record.state = ServiceState::Unhealthy;
                record.updated_at = Utc::now();
                self.store.save(&record)?;
                return Err(ServiceTimeout {
                    service: kind.to_string(),
                    seconds: self.start_timeout.as_secs(),
                    log_tail: log_tail(&log_file, LOG_TAIL_LINES),
                }
                .into());
            }
            if health::http_ok(&ready_url, READY_PROBE_TIMEOUT).await {
                record.state = ServiceState::Running;
                record.updated_at = Utc::now();
                self.store.save(&record)?;
                return Ok(StartReport {
                    state: ServiceState::Running,
                    preempted,
                });
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        record.state = ServiceState::Unhealthy;
        record.updated_at = Utc::now();
        self.store.save(&record)?;
        Err(ServiceTimeout {
            service: kind.to_string(),
            seconds: self.start_timeout.as_secs(),
            log_tail: log_tail(&log_file, LOG_TAIL_LINES),
        }
        .into())
    }

    /// Terminate whatever currently holds `port`, graceful first.
    async fn preempt_port(&self, port: u16) -> Result<Vec<u32>> {
        let mut preempted = Vec::new();
        let probe = self.probe();
        if let Some(pid) = probe.port_occupant(port).await? {
            self.terminate_pid(pid).await.with_context(|| {
                format!("preempting stale pid {pid} on port {port}")
            })?;
            preempted.push(pid);
        }
        Ok(preempted)
    }

    /// TERM, bounded wait, then KILL.
    async fn terminate_pid(&self, pid: u32) -> Result<()> {
        if !self.pid_alive(pid).await {
            return Ok(());
        }
        let pid_str = pid.to_string();
        let _ = self.runner.run("kill", &["-TERM", &pid_str]).await?;

        let deadline = tokio::time::Instant::now() + GRACEFUL_WAIT;
        while tokio::time::Instant::now() < deadline {
            if !self.pid_alive(pid).await {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let _ = self.runner.run("kill", &["-KILL", &pid_str]).await?;
        tokio::time::sleep(POLL_INTERVAL).await;
        if self.pid_alive(pid).await {
            anyhow::bail!("pid {pid} survived SIGKILL");
        }
        Ok(())
    }

    async fn pid_alive(&self, pid: u32) -> bool {
        self.runner
            .run("kill", &["-0", &pid.to_string()])
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

/// Substitute `{port}` and split a command template into program + args.
#[must_use]
pub fn split_command(template: &str, port: u16) -> (String, Vec<String>) {
    let substituted = template.replace("{port}", &port.to_string());
    let mut parts = substituted.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

/// Last `n` lines of a log file; empty when the file is unreadable.
#[must_use]
pub fn log_tail(path: &std::path::Path, n: usize) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| (*l).to_string()).collect()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
