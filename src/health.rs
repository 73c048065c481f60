//! Combined workspace health checks.
//!
//! Three independent sub-probes — backend HTTP, frontend HTTP, database
//! connectivity — each with its own timeout. Failures are independent: one
//! failing probe never short-circuits the others, and no probe retries.
//! External pollers call this repeatedly if they want retry behavior.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::allocator::Allocation;
use crate::command_runner::CommandRunner;
use crate::config::Layout;
use crate::docker::Docker;
use crate::probe::{DatabaseStatus, ResourceProbe};
use crate::workspace::WorkspacePaths;

/// Liveness path served by the backend.
pub const BACKEND_HEALTH_PATH: &str = "/health";

/// Backend gets the longest window: it may be cold-starting.
pub const BACKEND_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const FRONTEND_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DATABASE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of one optional sub-probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Ok,
    Failed,
    /// The probed component does not exist for this workspace (a project
    /// without a frontend directory has nothing to probe).
    Skipped,
}

/// Combined status for one workspace. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub backend: bool,
    pub frontend: ProbeOutcome,
    pub database: bool,
}

impl HealthReport {
    /// Overall health: every probe passed or was skipped.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.backend && self.database && self.frontend != ProbeOutcome::Failed
    }
}

/// `true` when `url` answers 2xx within `timeout`.
///
/// ureq is synchronous, so the request runs on the blocking pool rather
/// than stalling an async worker thread for up to `timeout`.
pub async fn http_ok(url: &str, timeout: Duration) -> bool {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || http_ok_blocking(&url, timeout))
        .await
        .unwrap_or(false)
}

fn http_ok_blocking(url: &str, timeout: Duration) -> bool {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout(timeout)
        .build();
    agent.get(url).call().is_ok()
}

/// Run all sub-probes for one workspace.
///
/// # Errors
///
/// Fails only when the database container itself is unreachable; probe
/// failures are reported in the result, not as errors.
pub async fn check<R: CommandRunner, D: Docker>(
    probe: &ResourceProbe<'_, R, D>,
    layout: &Layout,
    paths: &WorkspacePaths,
    alloc: &Allocation,
) -> Result<HealthReport> {
    let backend_url = format!(
        "http://127.0.0.1:{}{BACKEND_HEALTH_PATH}",
        alloc.backend_port
    );
    let backend = http_ok(&backend_url, BACKEND_PROBE_TIMEOUT).await;

    let frontend = if paths.has_frontend(layout) {
        let url = format!("http://127.0.0.1:{}/", alloc.frontend_port);
        if http_ok(&url, FRONTEND_PROBE_TIMEOUT).await {
            ProbeOutcome::Ok
        } else {
            ProbeOutcome::Failed
        }
    } else {
        ProbeOutcome::Skipped
    };

    let database = match probe.database_status(&alloc.database_name).await {
        Ok(DatabaseStatus::NotFound) => false,
        Ok(DatabaseStatus::NoSchema | DatabaseStatus::SchemaVersion(_)) => true,
        Err(e) => return Err(e),
    };

    Ok(HealthReport {
        backend,
        frontend,
        database,
    })
}

// ── Unit tests ───────────────────────────────────────────────────────────────
