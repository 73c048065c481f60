//! Registry loading and validation.
//!
//! The registry (`warren.yaml`) is the single declarative source for
//! project metadata, directory layout, port arithmetic, and per-agent
//! overrides. It is loaded once per run, never mutated by the engine, and
//! re-read on demand. Validation collects *every* violation before
//! failing so an operator fixes the file in one pass.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

/// Registry file name, looked up at the project root.
pub const REGISTRY_FILE: &str = "warren.yaml";

/// Fallback backend base port when no registry exists yet.
pub const DEFAULT_BACKEND_PORT: u16 = 6789;
/// Fallback frontend base port when no registry exists yet.
pub const DEFAULT_FRONTEND_PORT: u16 = 3000;
/// Fallback per-agent port offset when no registry exists yet.
pub const DEFAULT_PORT_OFFSET: u16 = 10;
/// Base Chrome remote-debugging port; per-agent offsets apply on top.
pub const DEFAULT_CHROME_DEBUG_PORT: u16 = 9222;

/// Lowest port an agent may claim (below this is privileged).
pub const MIN_PORT: u16 = 1024;

/// Name of the implicit main workspace. Reserved; agents may not use it.
pub const MAIN_WORKSPACE: &str = "main";

// ── Registry schema ──────────────────────────────────────────────────────────

/// Relative paths describing where the managed application keeps things.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Layout {
    /// Backend project root (where the migration tool runs).
    pub backend_project_dir: String,
    /// Backend application dir (its env file is the required template).
    pub backend_app_dir: String,
    /// Frontend dir. Optional at provisioning time: a project without this
    /// directory simply has no frontend service.
    pub frontend_dir: String,
    /// Path of the meta-config env file (workspace identity keys live here).
    pub docker_env_path: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            backend_project_dir: "backend".to_string(),
            backend_app_dir: "backend/app".to_string(),
            frontend_dir: "frontend".to_string(),
            docker_env_path: ".env".to_string(),
        }
    }
}

/// Port arithmetic for computed allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortConfig {
    pub base_backend_port: u16,
    pub base_frontend_port: u16,
    pub port_offset: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            base_backend_port: DEFAULT_BACKEND_PORT,
            base_frontend_port: DEFAULT_FRONTEND_PORT,
            port_offset: DEFAULT_PORT_OFFSET,
        }
    }
}

/// Shared infrastructure every workspace talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Infrastructure {
    /// Container network all workspace containers join.
    pub docker_network: String,
    /// Redis URL shared across workspaces (queue broker).
    pub redis_url: String,
    /// Substring used to locate the shared database container.
    pub db_container_pattern: String,
    /// Schemas copied from the main database into each new workspace
    /// database. Empty means no schema copy.
    pub shared_schemas: Vec<String>,
}

impl Default for Infrastructure {
    fn default() -> Self {
        Self {
            docker_network: "warren-net".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            db_container_pattern: "postgres".to_string(),
            shared_schemas: Vec::new(),
        }
    }
}

/// Launch command lines for host-run services. `{port}` is substituted
/// with the allocated port at start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceCommands {
    pub backend: String,
    pub frontend: String,
    /// Compose file (relative to the workspace root) for the worker stack.
    pub worker_compose_file: String,
}

impl Default for ServiceCommands {
    fn default() -> Self {
        Self {
            backend: "uvicorn app.main:app --host 127.0.0.1 --port {port}".to_string(),
            frontend: "npm run dev -- --port {port}".to_string(),
            worker_compose_file: "docker-compose.worker.yml".to_string(),
        }
    }
}

/// Immutable project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Project name; seeds database and directory names.
    pub name: String,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub port_config: PortConfig,
    #[serde(default)]
    pub infrastructure: Infrastructure,
    #[serde(default)]
    pub commands: ServiceCommands,
}

/// One workspace entry. Omitted numeric fields are computed by formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    /// Unique key, e.g. a color or arbitrary label.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_debug_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

impl AgentDefinition {
    /// Explicit display name, or a capitalized form of the agent name.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| capitalize(&self.name))
    }
}

/// Capitalize the first character (`blue` → `Blue`).
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// The full declarative registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub project: ProjectConfig,
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
}

/// Where a loaded registry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// Parsed from the registry file at this path.
    File(PathBuf),
    /// No registry file exists; defaults derived from the directory name.
    /// Callers must surface a warning so first-time users know to run setup.
    Fallback,
}

/// A registry plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedRegistry {
    pub registry: Registry,
    pub source: RegistrySource,
}

impl Registry {
    /// Load and validate the registry under `root`, falling back to
    /// directory-name defaults when no registry file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] (all violations collected) for an invalid
    /// file, or an I/O error if the file exists but cannot be read.
    pub fn load(root: &Path) -> Result<LoadedRegistry> {
        let path = root.join(REGISTRY_FILE);
        if !path.exists() {
            return Ok(LoadedRegistry {
                registry: Self::fallback(root),
                source: RegistrySource::Fallback,
            });
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading registry {}", path.display()))?;
        let registry: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing registry {}", path.display()))?;
        registry.validate()?;
        Ok(LoadedRegistry {
            registry,
            source: RegistrySource::File(path),
        })
    }

    /// Registry synthesized from the directory name and default ports.
    /// Keeps the tool usable before first-time setup.
    #[must_use]
    pub fn fallback(root: &Path) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "project".to_string());
        Self {
            project: ProjectConfig {
                name,
                layout: Layout::default(),
                port_config: PortConfig::default(),
                infrastructure: Infrastructure::default(),
                commands: ServiceCommands::default(),
            },
            agents: Vec::new(),
        }
    }

    /// Validate the registry schema, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] with one entry per violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.project.name.trim().is_empty() {
            violations.push("project name is empty".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                violations.push("agent with empty name".to_string());
                continue;
            }
            if agent.name == MAIN_WORKSPACE {
                violations.push(format!(
                    "agent name '{MAIN_WORKSPACE}' is reserved for the implicit main workspace"
                ));
            }
            if !seen.insert(agent.name.as_str()) {
                violations.push(format!("duplicate agent name '{}'", agent.name));
            }
            for (label, port) in [
                ("backendPort", agent.backend_port),
                ("frontendPort", agent.frontend_port),
                ("chromeDebugPort", agent.chrome_debug_port),
            ] {
                if let Some(p) = port {
                    if p < MIN_PORT {
                        violations.push(format!(
                            "agent '{}': {label} {p} out of range [{MIN_PORT}, 65535]",
                            agent.name
                        ));
                    }
                }
            }
            if let (Some(b), Some(f)) = (agent.backend_port, agent.frontend_port) {
                if b == f {
                    violations.push(format!(
                        "agent '{}': backendPort and frontendPort are both {b}",
                        agent.name
                    ));
                }
            }
        }

        if self.project.port_config.port_offset == 0 && self.agents.len() > 1 {
            violations.push("portOffset 0 cannot separate multiple agents".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }

    /// Look up an agent definition by name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<(usize, &AgentDefinition)> {
        self.agents
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
