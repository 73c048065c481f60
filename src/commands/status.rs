//! `warren status` — every workspace, its ports, and service states.

use anyhow::Result;

use crate::allocator;
use crate::app::AppContext;
use crate::services::{RecordStore, ServiceKind, ServiceState};
use crate::workspace::WorkspacePaths;

/// Run `warren status`.
///
/// # Errors
///
/// Returns an error when the registry is invalid or a service record
/// cannot be read.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let loaded = ctx.load_registry()?;
    let registry = &loaded.registry;
    registry.validate()?;
    allocator::validate_allocations(registry)?;

    let mut rows = Vec::new();
    for name in allocator::workspace_names(registry) {
        let alloc = allocator::resolve(registry, &name)?;
        let paths = WorkspacePaths::new(&ctx.project_root, &name);
        let exists = paths.exists();

        let mut services = serde_json::Map::new();
        if exists {
            let store = RecordStore::for_workspace(&paths);
            for kind in ServiceKind::ALL {
                let state = store
                    .load(kind)?
                    .map_or(ServiceState::Stopped, |r| r.state);
                services.insert(kind.to_string(), serde_json::to_value(state)?);
            }
        }

        rows.push(serde_json::json!({
            "name": name,
            "exists": exists,
            "backendPort": alloc.backend_port,
            "frontendPort": alloc.frontend_port,
            "chromeDebugPort": alloc.chrome_debug_port,
            "database": alloc.database_name,
            "services": services,
        }));
    }

    if ctx.is_json() {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "workspaces": rows }))?
        );
        return Ok(());
    }

    ctx.output.header("Workspaces");
    for row in &rows {
        let name = row["name"].as_str().unwrap_or("?");
        if row["exists"].as_bool() == Some(true) {
            let services = row["services"]
                .as_object()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| format!("{k}:{}", v.as_str().unwrap_or("?")))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            let database = row["database"].as_str().unwrap_or("?");
            ctx.output.kv(
                name,
                &format!(
                    "backend:{} frontend:{} db:{database}  [{services}]",
                    row["backendPort"], row["frontendPort"]
                ),
            );
        } else {
            ctx.output.kv(name, "not provisioned");
        }
    }
    Ok(())
}
