//! `warren sync <agent> [--pull] [--migrate]` — refresh a workspace.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::lifecycle::{Lifecycle, NullProgress, Progress};
use crate::output::progress::StepProgress;
use crate::synth::SynthAction;

/// Arguments for the sync command.
#[derive(Args)]
pub struct SyncArgs {
    /// Agent name
    pub agent: String,

    /// Stash local changes and pull the latest branch state first
    #[arg(long)]
    pub pull: bool,

    /// Run migrations after refreshing env files
    #[arg(long)]
    pub migrate: bool,
}

/// Run `warren sync`.
///
/// # Errors
///
/// Returns an error when the workspace does not exist or a step fails.
pub async fn run(ctx: &AppContext, args: &SyncArgs) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, &loaded.registry, &ctx.project_root);

    let steps = StepProgress::new(&ctx.output);
    let progress: &dyn Progress = if ctx.is_json() { &NullProgress } else { &steps };

    let report = lifecycle
        .sync(
            &args.agent,
            args.pull,
            args.migrate,
            ctx.overwrite_policy(),
            progress,
        )
        .await?;
    steps.done();

    let written = report
        .synthesis
        .files
        .iter()
        .filter(|(_, action)| *action == SynthAction::Written)
        .count();
    let skipped = report.synthesis.files.len() - written;

    if ctx.is_json() {
        let obj = serde_json::json!({
            "agent": args.agent,
            "pulled": report.pulled,
            "written": written,
            "skipped": skipped,
            "migrated": report.migrated,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    ctx.output
        .success(&format!("{written} env file(s) refreshed, {skipped} skipped"));
    if report.migrated {
        ctx.output.success("migrations applied");
    }
    Ok(())
}
