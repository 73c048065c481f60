//! `warren logs <agent> <service>` — show recent service output.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::command_runner::CommandRunner;
use crate::lifecycle::Lifecycle;
use crate::services::{self, ServiceKind};

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Agent name
    pub agent: String,

    /// Service (backend, worker, frontend)
    pub service: String,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value_t = 50)]
    pub lines: usize,
}

/// Run `warren logs`.
///
/// # Errors
///
/// Returns an error when the workspace is unknown or the worker's
/// container logs cannot be fetched.
pub async fn run(ctx: &AppContext, args: &LogsArgs) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, &loaded.registry, &ctx.project_root);
    let (_, paths) = lifecycle.resolve_workspace(&args.agent)?;
    if !paths.exists() {
        anyhow::bail!("workspace '{}' does not exist", args.agent);
    }

    let kind: ServiceKind = args.service.parse()?;
    match kind {
        ServiceKind::Worker => {
            // Container-backed: delegate to compose, which owns the logs.
            let compose_file = &loaded.registry.project.commands.worker_compose_file;
            let project = format!("{}-{}", loaded.registry.project.name, args.agent)
                .to_lowercase()
                .replace('_', "-");
            let dir = paths.root().to_string_lossy().to_string();
            let tail = args.lines.to_string();
            let out = ctx
                .runner
                .run(
                    "docker",
                    &[
                        "compose",
                        "--project-directory",
                        &dir,
                        "-p",
                        &project,
                        "-f",
                        compose_file,
                        "logs",
                        "--tail",
                        &tail,
                    ],
                )
                .await?;
            if !out.status.success() {
                let stderr = String::from_utf8_lossy(&out.stderr);
                anyhow::bail!("docker compose logs failed: {}", stderr.trim());
            }
            print!("{}", String::from_utf8_lossy(&out.stdout));
        }
        ServiceKind::Backend | ServiceKind::Frontend => {
            let path = paths.logs_dir().join(format!("{kind}.log"));
            if !path.exists() {
                ctx.output
                    .info(&format!("no log file yet for {kind} ({})", path.display()));
                return Ok(());
            }
            for line in services::log_tail(&path, args.lines) {
                println!("{line}");
            }
        }
    }
    Ok(())
}
