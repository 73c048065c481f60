//! `warren delete <agent> [--keep-database]` — tear a workspace down.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::lifecycle::Lifecycle;

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Agent name
    pub agent: String,

    /// Keep the agent's database (drop is the default)
    #[arg(long)]
    pub keep_database: bool,
}

/// Run `warren delete`.
///
/// # Errors
///
/// Returns an error when teardown fails or confirmation is declined.
pub async fn run(ctx: &AppContext, args: &DeleteArgs) -> Result<()> {
    let detail = if args.keep_database {
        "its services and directory (database kept)"
    } else {
        "its services, directory, and database"
    };
    // `--yes` (or CI) skips the prompt and proceeds; the interactive
    // default is to decline.
    let prompt = format!("Delete workspace '{}' and {detail}?", args.agent);
    if !ctx.non_interactive && !ctx.confirm(&prompt, false)? {
        ctx.output.info("cancelled");
        return Ok(());
    }

    let loaded = ctx.load_registry()?;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, &loaded.registry, &ctx.project_root);
    lifecycle
        .delete(&args.agent, args.keep_database, &ctx.output)
        .await?;

    ctx.output
        .success(&format!("workspace '{}' removed", args.agent));
    Ok(())
}
