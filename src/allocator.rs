//! Deterministic port and database allocation.
//!
//! Pure functions over a loaded [`Registry`]: no I/O, no async. Resolution
//! order is first-match-wins with no merging:
//!
//! 1. explicit value on the agent definition,
//! 2. `base + index * offset` over the agent's 0-based registry position,
//! 3. a fixed fallback table for the first four conventional names
//!    (pre-setup path, when the name is not in the registry at all).
//!
//! `main` is a fixed special case: unmodified base ports, bare project
//! name as database. Uniqueness across the whole registry plus `main` is
//! checked eagerly at load time so a conflict is reported once, with all
//! conflicting names, before any provisioning begins.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::config::{DEFAULT_CHROME_DEBUG_PORT, MAIN_WORKSPACE, Registry};
use crate::errors::{AllocationConflict, ConflictGroup};

/// Conventional agent names usable before any registry exists.
pub const CONVENTIONAL_NAMES: [&str; 4] = ["blue", "green", "yellow", "purple"];

/// Resolved resources for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub backend_port: u16,
    pub frontend_port: u16,
    pub chrome_debug_port: u16,
    pub database_name: String,
}

/// Resolve the allocation for `name`.
///
/// # Errors
///
/// Fails only for a name that is neither `main`, nor in the registry, nor
/// one of the conventional fallback names.
pub fn resolve(registry: &Registry, name: &str) -> Result<Allocation> {
    let ports = &registry.project.port_config;

    if name == MAIN_WORKSPACE {
        return Ok(Allocation {
            backend_port: ports.base_backend_port,
            frontend_port: ports.base_frontend_port,
            chrome_debug_port: DEFAULT_CHROME_DEBUG_PORT,
            database_name: registry.project.name.clone(),
        });
    }

    if let Some((index, agent)) = registry.agent(name) {
        let idx = u16::try_from(index).unwrap_or(u16::MAX);
        return Ok(Allocation {
            backend_port: agent
                .backend_port
                .unwrap_or_else(|| formula(ports.base_backend_port, idx, ports.port_offset)),
            frontend_port: agent
                .frontend_port
                .unwrap_or_else(|| formula(ports.base_frontend_port, idx, ports.port_offset)),
            chrome_debug_port: agent.chrome_debug_port.unwrap_or_else(|| {
                // main owns the bare debug port, so agents start one offset up.
                formula(DEFAULT_CHROME_DEBUG_PORT, idx + 1, ports.port_offset)
            }),
            database_name: agent
                .database_name
                .clone()
                .unwrap_or_else(|| default_database_name(&registry.project.name, name)),
        });
    }

    if let Some(slot) = CONVENTIONAL_NAMES.iter().position(|n| *n == name) {
        // Slots sit one offset above base so none collide with main.
        let idx = u16::try_from(slot + 1).unwrap_or(u16::MAX);
        return Ok(Allocation {
            backend_port: formula(ports.base_backend_port, idx, ports.port_offset),
            frontend_port: formula(ports.base_frontend_port, idx, ports.port_offset),
            chrome_debug_port: formula(DEFAULT_CHROME_DEBUG_PORT, idx, ports.port_offset),
            database_name: default_database_name(&registry.project.name, name),
        });
    }

    anyhow::bail!(
        "unknown agent '{name}'. Add it to the agents list in warren.yaml, \
         or use one of: {}",
        CONVENTIONAL_NAMES.join(", ")
    )
}

/// `{project}_{agent}` — the default workspace database name.
#[must_use]
pub fn default_database_name(project: &str, agent: &str) -> String {
    format!("{project}_{agent}")
}

fn formula(base: u16, index: u16, offset: u16) -> u16 {
    base.saturating_add(index.saturating_mul(offset))
}

/// Every workspace name the registry implies, `main` first.
#[must_use]
pub fn workspace_names(registry: &Registry) -> Vec<String> {
    let mut names = vec![MAIN_WORKSPACE.to_string()];
    names.extend(registry.agents.iter().map(|a| a.name.clone()));
    names
}

/// Eagerly verify global uniqueness of `(backendPort, frontendPort,
/// databaseName)` across every agent plus the implicit `main` workspace.
///
/// Explicit-vs-computed collisions are caught the same as computed-vs-
/// computed ones because the check runs over fully resolved allocations.
///
/// # Errors
///
/// Returns [`AllocationConflict`] listing, per colliding value, every
/// workspace that claims it.
pub fn validate_allocations(registry: &Registry) -> Result<(), AllocationConflict> {
    let mut resolved = Vec::new();
    for name in workspace_names(registry) {
        // Registry members and main always resolve.
        if let Ok(alloc) = resolve(registry, &name) {
            resolved.push((name, alloc));
        }
    }

    let mut conflicts = Vec::new();
    collect_conflicts(&mut conflicts, "backend port", &resolved, |a| {
        a.backend_port.to_string()
    });
    collect_conflicts(&mut conflicts, "frontend port", &resolved, |a| {
        a.frontend_port.to_string()
    });
    collect_conflicts(&mut conflicts, "database name", &resolved, |a| {
        a.database_name.clone()
    });

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(AllocationConflict { conflicts })
    }
}

fn collect_conflicts(
    out: &mut Vec<ConflictGroup>,
    resource: &'static str,
    resolved: &[(String, Allocation)],
    key: impl Fn(&Allocation) -> String,
) {
    let mut by_value: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, alloc) in resolved {
        by_value.entry(key(alloc)).or_default().push(name.clone());
    }
    for (value, claimants) in by_value {
        if claimants.len() > 1 {
            out.push(ConflictGroup {
                resource,
                value,
                claimants,
            });
        }
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod proptests {
    use super::*;
    use crate::config::{PortConfig, ProjectConfig, Registry};
    use proptest::prelude::*;

    fn registry_with(offset: u16, count: usize) -> Registry {
        Registry {
            project: ProjectConfig {
                name: "proj".into(),
                layout: crate::config::Layout::default(),
                port_config: PortConfig {
                    base_backend_port: 20000,
                    base_frontend_port: 30000,
                    port_offset: offset,
                },
                infrastructure: crate::config::Infrastructure::default(),
                commands: crate::config::ServiceCommands::default(),
            },
            agents: (0..count)
                .map(|i| crate::config::AgentDefinition {
                    name: format!("agent{i}"),
                    display_name: None,
                    backend_port: None,
                    frontend_port: None,
                    chrome_debug_port: None,
                    database_name: None,
                })
                .collect(),
        }
    }

    proptest! {
        /// Formula-computed ports are distinct across agents whenever the
        /// offset is non-zero.
        #[test]
        fn prop_computed_ports_distinct(offset in 1u16..100, count in 2usize..8) {
            let reg = registry_with(offset, count);
            let mut ports = std::collections::HashSet::new();
            for agent in &reg.agents {
                let alloc = resolve(&reg, &agent.name).expect("resolves");
                prop_assert!(ports.insert(alloc.backend_port));
            }
        }

        /// Resolution is deterministic: same registry + name, same result.
        #[test]
        fn prop_resolve_is_deterministic(offset in 1u16..100, count in 1usize..8, pick in 0usize..8) {
            let reg = registry_with(offset, count);
            let name = reg.agents[pick % count].name.clone();
            let a = resolve(&reg, &name).expect("resolves");
            let b = resolve(&reg, &name).expect("resolves");
            prop_assert_eq!(a, b);
        }

        /// Database names always embed the agent name, so two distinct
        /// agents never share a default database.
        #[test]
        fn prop_default_database_names_distinct(count in 2usize..8) {
            let reg = registry_with(10, count);
            let mut dbs = std::collections::HashSet::new();
            for agent in &reg.agents {
                let alloc = resolve(&reg, &agent.name).expect("resolves");
                prop_assert!(dbs.insert(alloc.database_name));
            }
        }
    }
}
