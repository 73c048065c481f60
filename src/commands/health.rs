//! `warren health [agent]` — probe workspace health.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::allocator;
use crate::health;
use crate::lifecycle::Lifecycle;
use crate::probe::ResourceProbe;

/// Arguments for the health command.
#[derive(Args)]
pub struct HealthArgs {
    /// Agent name; all workspaces when omitted
    pub agent: Option<String>,
}

/// Run `warren health`.
///
/// # Errors
///
/// Returns an error when the registry is invalid or the database
/// container is unreachable. An unhealthy workspace is reported, not an
/// error.
pub async fn run(ctx: &AppContext, args: &HealthArgs) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let registry = &loaded.registry;
    let lifecycle = Lifecycle::new(&ctx.runner, &ctx.docker, registry, &ctx.project_root);

    let names = match &args.agent {
        Some(name) => vec![name.clone()],
        None => allocator::workspace_names(registry),
    };

    let probe = ResourceProbe::new(&ctx.runner, &ctx.docker, &registry.project.infrastructure);
    let mut results = Vec::new();
    for name in names {
        let (alloc, paths) = lifecycle.resolve_workspace(&name)?;
        if !paths.exists() {
            continue;
        }
        let report = health::check(&probe, &registry.project.layout, &paths, &alloc).await?;
        results.push((name, report));
    }

    if ctx.is_json() {
        let obj: Vec<_> = results
            .iter()
            .map(|(name, report)| {
                serde_json::json!({
                    "workspace": name,
                    "healthy": report.is_healthy(),
                    "report": report,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    ctx.output.header("Workspace Health");
    for (name, report) in &results {
        let mark = if report.is_healthy() { "healthy" } else { "unhealthy" };
        ctx.output.kv(name, mark);
        ctx.output.kv(
            "  backend",
            if report.backend { "ok" } else { "failed" },
        );
        ctx.output.kv("  frontend", &format!("{:?}", report.frontend).to_lowercase());
        ctx.output.kv(
            "  database",
            if report.database { "ok" } else { "failed" },
        );
    }
    Ok(())
}
