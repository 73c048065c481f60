//! `warren start|stop|restart <agent> [service]` — service control.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::lifecycle::Lifecycle;
use crate::services::{ServiceController, ServiceKind};
use crate::workspace::WorkspaceLock;

/// Which control verb is being executed.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    Start,
    Stop,
    Restart,
}

/// Arguments shared by start, stop, and restart.
#[derive(Args)]
pub struct ServiceArgs {
    /// Agent name
    pub agent: String,

    /// Single service (backend, worker, frontend); all when omitted
    pub service: Option<String>,
}

/// Run a service control verb against one workspace.
///
/// # Errors
///
/// Returns an error when the workspace is unknown or a service
/// transition fails.
pub async fn run(ctx: &AppContext, action: Action, args: &ServiceArgs) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, &loaded.registry, &ctx.project_root);
    let (alloc, paths) = lifecycle.resolve_workspace(&args.agent)?;
    if !paths.exists() {
        anyhow::bail!(
            "workspace '{}' does not exist; run `warren create {}` first",
            args.agent,
            args.agent
        );
    }
    let _lock = WorkspaceLock::acquire(&paths)?;

    let kinds: Vec<ServiceKind> = match &args.service {
        Some(name) => vec![name.parse()?],
        None => lifecycle.present_services(&paths),
    };

    let controller = ServiceController::new(
        &ctx.runner,
        &ctx.docker,
        &loaded.registry.project,
        &args.agent,
        &alloc,
        paths.clone(),
    );

    for kind in kinds {
        match action {
            Action::Start => {
                let report = controller.start(kind).await?;
                for pid in &report.preempted {
                    ctx.output
                        .warn(&format!("preempted stale pid {pid} on {kind} port"));
                }
                ctx.output.success(&format!("{kind} {}", report.state));
            }
            Action::Stop => {
                // Stopping in reverse order is unnecessary: the services
                // have no runtime dependencies on each other.
                controller.stop(kind).await?;
                ctx.output.success(&format!("{kind} stopped"));
            }
            Action::Restart => {
                let report = controller.restart(kind).await?;
                ctx.output.success(&format!("{kind} {}", report.state));
            }
        }
    }
    Ok(())
}
