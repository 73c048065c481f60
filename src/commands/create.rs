//! `warren create <agent>` — provision a workspace end to end.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::lifecycle::{CreateOptions, Lifecycle, NullProgress, Progress};
use crate::output::progress::StepProgress;
use crate::synth::SynthAction;

/// Arguments for the create command.
#[derive(Args)]
pub struct CreateArgs {
    /// Agent name (registry entry or conventional name)
    pub agent: String,

    /// Skip running migrations against the new database
    #[arg(long)]
    pub no_migrate: bool,

    /// Provision only; do not start services
    #[arg(long)]
    pub no_start: bool,
}

/// Run `warren create <agent>`.
///
/// # Errors
///
/// Returns an error when any provisioning step fails.
pub async fn run(ctx: &AppContext, args: &CreateArgs) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, &loaded.registry, &ctx.project_root);

    // Spinners would interleave with the JSON document, so JSON mode runs
    // silently until the report is ready.
    let steps = StepProgress::new(&ctx.output);
    let progress: &dyn Progress = if ctx.is_json() { &NullProgress } else { &steps };

    let report = lifecycle
        .create(
            &args.agent,
            CreateOptions {
                policy: ctx.overwrite_policy(),
                migrate: !args.no_migrate,
                start_services: !args.no_start,
            },
            progress,
        )
        .await?;
    steps.done();

    if ctx.is_json() {
        let started: Vec<_> = report
            .started
            .iter()
            .map(|(kind, r)| serde_json::json!({ "service": kind, "state": r.state }))
            .collect();
        let obj = serde_json::json!({
            "agent": args.agent,
            "allocation": report.allocation,
            "databaseCreated": report.database_created,
            "services": started,
            "health": report.health,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    ctx.output.header(&format!("Workspace '{}' ready", args.agent));
    ctx.output
        .kv("backend", &report.allocation.backend_port.to_string());
    ctx.output
        .kv("frontend", &report.allocation.frontend_port.to_string());
    ctx.output
        .kv("chrome", &report.allocation.chrome_debug_port.to_string());
    ctx.output.kv("database", &report.allocation.database_name);

    let written = report
        .synthesis
        .files
        .iter()
        .filter(|(_, action)| *action == SynthAction::Written)
        .count();
    ctx.output.success(&format!("{written} env file(s) synthesized"));
    if report.database_created {
        ctx.output
            .success(&format!("database {} created", report.allocation.database_name));
    }
    for (kind, start) in &report.started {
        ctx.output.success(&format!("{kind} {}", start.state));
    }
    if let Some(health) = &report.health {
        if health.is_healthy() {
            ctx.output.success("all health probes passed");
        } else {
            ctx.output.warn("workspace is not fully healthy yet");
        }
    }
    Ok(())
}
