//! `warren validate-config` — check the registry and show every allocation.

use anyhow::Result;

use crate::allocator;
use crate::app::AppContext;
use crate::config::RegistrySource;

/// Run `warren validate-config`.
///
/// # Errors
///
/// Returns an error when the registry has violations or allocations
/// conflict; the error lists every problem, not just the first.
pub fn run(ctx: &AppContext) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let registry = &loaded.registry;

    registry.validate()?;
    allocator::validate_allocations(registry)?;

    let allocations: Vec<_> = allocator::workspace_names(registry)
        .into_iter()
        .map(|name| {
            let alloc = allocator::resolve(registry, &name)?;
            Ok(serde_json::json!({ "name": name, "allocation": alloc }))
        })
        .collect::<Result<_>>()?;

    if ctx.is_json() {
        let source = match &loaded.source {
            RegistrySource::File(_) => "file",
            RegistrySource::Fallback => "fallback",
        };
        let obj = serde_json::json!({
            "valid": true,
            "source": source,
            "project": registry.project.name,
            "workspaces": allocations,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    match &loaded.source {
        RegistrySource::File(_) => ctx.output.success("warren.yaml is valid"),
        RegistrySource::Fallback => ctx
            .output
            .warn("no warren.yaml found; using conventional defaults"),
    }
    ctx.output.header(&format!("Project '{}'", registry.project.name));
    for entry in &allocations {
        let name = entry["name"].as_str().unwrap_or("?");
        let alloc = &entry["allocation"];
        let database = alloc["database_name"].as_str().unwrap_or("?");
        ctx.output.kv(
            name,
            &format!(
                "backend:{} frontend:{} chrome:{} db:{database}",
                alloc["backend_port"], alloc["frontend_port"], alloc["chrome_debug_port"]
            ),
        );
    }
    Ok(())
}
