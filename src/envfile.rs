//! Env-file parsing, role classification, and override rules.
//!
//! Pure functions only: no I/O, no async. [`crate::synth`] walks the tree
//! and does the copying; everything here is data in, data out, so the
//! override logic stays exhaustive and testable in isolation.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Layout;

// ── Role classification ──────────────────────────────────────────────────────

/// What kind of env file a path holds, which decides its override rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Workspace identity keys (agent name/color, workspace name).
    MetaConfig,
    /// Backend application config: database name, backend port.
    BackendApp,
    /// Frontend config: API URL/port keys pointing at the backend.
    Frontend,
    /// Everything else. Copied byte-for-byte, never mutated: shared
    /// secrets and infrastructure settings must stay identical across
    /// workspaces.
    Opaque,
}

/// Classify a source-relative path into its [`Role`].
#[must_use]
pub fn classify(relative_path: &Path, layout: &Layout) -> Role {
    if relative_path == Path::new(&layout.docker_env_path) {
        return Role::MetaConfig;
    }
    if relative_path.starts_with(&layout.backend_app_dir) {
        return Role::BackendApp;
    }
    if relative_path.starts_with(&layout.frontend_dir) {
        return Role::Frontend;
    }
    Role::Opaque
}

/// Whether a file name is an environment-definition file.
///
/// Matches `.env` and `.env.*`, excluding sample/example/template/dist
/// suffixes which are documentation, not live configuration.
#[must_use]
pub fn is_env_file_name(name: &str) -> bool {
    if name != ".env" && !name.starts_with(".env.") {
        return false;
    }
    const DOC_SUFFIXES: [&str; 4] = [".sample", ".example", ".template", ".dist"];
    !DOC_SUFFIXES.iter().any(|s| name.ends_with(s))
}

// ── Override key sets ────────────────────────────────────────────────────────

pub const META_AGENT_NAME_KEY: &str = "AGENT_NAME";
pub const META_AGENT_COLOR_KEY: &str = "AGENT_COLOR";
pub const META_WORKSPACE_NAME_KEY: &str = "WORKSPACE_NAME";

/// Database-name keys checked in order; the first present is set,
/// otherwise the first is appended.
pub const BACKEND_DB_KEYS: [&str; 3] = ["POSTGRES_DB", "DATABASE_NAME", "DB_NAME"];

/// Full connection URL whose trailing database segment is rewritten.
pub const DATABASE_URL_KEY: &str = "DATABASE_URL";

/// Backend-port keys, set only when already present.
pub const BACKEND_PORT_KEYS: [&str; 3] = ["BACKEND_PORT", "APP_PORT", "UVICORN_PORT"];

/// Frontend keys holding a full API URL; the port inside is rewritten.
/// Multiple frontend toolchains, hence multiple naming conventions.
pub const FRONTEND_API_URL_KEYS: [&str; 3] =
    ["VITE_API_URL", "NEXT_PUBLIC_API_URL", "REACT_APP_API_URL"];

/// Frontend keys holding a bare API port.
pub const FRONTEND_API_PORT_KEYS: [&str; 3] = ["VITE_API_PORT", "REACT_APP_API_PORT", "API_PORT"];

// ── Line-preserving env file ─────────────────────────────────────────────────

/// A dotenv-style file held as raw lines. Comments, blank lines, ordering,
/// and unrelated entries survive edits untouched, which is what makes
/// repeated synthesis byte-stable.
#[derive(Debug, Clone)]
pub struct EnvFile {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl EnvFile {
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let trailing_newline = content.is_empty() || content.ends_with('\n');
        let trimmed = content.strip_suffix('\n').unwrap_or(content);
        let lines = if trimmed.is_empty() && content.len() <= 1 {
            Vec::new()
        } else {
            trimmed.split('\n').map(str::to_string).collect()
        };
        Self {
            lines,
            trailing_newline,
        }
    }

    /// Value of `key`, if a `KEY=value` line exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|l| match_key(l, key))
    }

    /// Set `key` to `value`, appending the entry if absent.
    pub fn set(&mut self, key: &str, value: &str) {
        if !self.set_if_present(key, value) {
            self.lines.push(format!("{key}={value}"));
            self.trailing_newline = true;
        }
    }

    /// Set `key` only when a line for it already exists. Returns whether a
    /// line was updated.
    pub fn set_if_present(&mut self, key: &str, value: &str) -> bool {
        let mut updated = false;
        for line in &mut self.lines {
            if match_key(line, key).is_some() {
                let prefix = if line.trim_start().starts_with("export ") {
                    "export "
                } else {
                    ""
                };
                *line = format!("{prefix}{key}={value}");
                updated = true;
            }
        }
        updated
    }

    /// Rewrite the value of `key` through `f` when present.
    pub fn map_value(&mut self, key: &str, f: impl Fn(&str) -> String) -> bool {
        if let Some(current) = self.get(key).map(str::to_string) {
            self.set_if_present(key, &f(&current))
        } else {
            false
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Match a `KEY=value` or `export KEY=value` line, returning the value.
fn match_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let body = line.trim_start();
    let body = body.strip_prefix("export ").unwrap_or(body);
    let rest = body.strip_prefix(key)?;
    rest.strip_prefix('=')
}

// ── Role override rules ──────────────────────────────────────────────────────

/// Values a workspace's env files are rewritten with.
pub struct OverrideContext<'a> {
    pub agent: &'a str,
    pub display_name: &'a str,
    pub backend_port: u16,
    pub database_name: &'a str,
}

/// Apply the role-specific key overrides to `content`.
///
/// One handler per [`Role`] variant; `Opaque` returns the input unchanged.
/// Applying twice with the same context is a fixed point.
#[must_use]
pub fn apply_overrides(content: &str, role: Role, ctx: &OverrideContext<'_>) -> String {
    match role {
        Role::Opaque => content.to_string(),
        Role::MetaConfig => {
            // AGENT_COLOR and WORKSPACE_NAME carry the short agent name;
            // AGENT_NAME is the human-facing display name.
            let mut env = EnvFile::parse(content);
            env.set(META_AGENT_NAME_KEY, ctx.display_name);
            env.set(META_AGENT_COLOR_KEY, ctx.agent);
            env.set(META_WORKSPACE_NAME_KEY, ctx.agent);
            env.render()
        }
        Role::BackendApp => {
            let mut env = EnvFile::parse(content);
            let mut any_db_key = false;
            for key in BACKEND_DB_KEYS {
                any_db_key |= env.set_if_present(key, ctx.database_name);
            }
            if !any_db_key {
                env.set(BACKEND_DB_KEYS[0], ctx.database_name);
            }
            env.map_value(DATABASE_URL_KEY, |url| {
                rewrite_url_database(url, ctx.database_name)
            });
            for key in BACKEND_PORT_KEYS {
                env.set_if_present(key, &ctx.backend_port.to_string());
            }
            env.render()
        }
        Role::Frontend => {
            let mut env = EnvFile::parse(content);
            for key in FRONTEND_API_URL_KEYS {
                env.map_value(key, |url| rewrite_url_port(url, ctx.backend_port));
            }
            for key in FRONTEND_API_PORT_KEYS {
                env.set_if_present(key, &ctx.backend_port.to_string());
            }
            env.render()
        }
    }
}

/// Replace the database segment of a connection URL
/// (`...host:5432/olddb?x=y` → `...host:5432/newdb?x=y`).
#[must_use]
pub fn rewrite_url_database(url: &str, database: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::expect_used)] // pattern is a compile-time constant
        Regex::new(r"(//[^/]+/)[^/?#]+").expect("valid regex")
    });
    re.replace(url, format!("${{1}}{database}")).into_owned()
}

/// Replace an explicit `:port` in an http(s) URL.
#[must_use]
pub fn rewrite_url_port(url: &str, port: u16) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::expect_used)] // pattern is a compile-time constant
        Regex::new(r"^(https?://[^/:]+):\d+").expect("valid regex")
    });
    re.replace(url, format!("${{1}}:{port}")).into_owned()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
