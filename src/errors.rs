//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to
//! `anyhow::Error` via the `?` operator. Every fatal variant names the
//! resource implicated and, where one exists, a remediation command.

use thiserror::Error;

// ── Registry errors ───────────────────────────────────────────────────────────

/// Invalid or ambiguous registry. Always fatal; always carries *every*
/// violation found, not just the first.
#[derive(Debug, Error)]
pub struct ConfigError {
    /// Human-readable violation descriptions, one per problem.
    pub violations: Vec<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "invalid registry ({} violations):", self.violations.len())?;
        for v in &self.violations {
            writeln!(f, "  - {v}")?;
        }
        write!(f, "Fix warren.yaml and re-run 'warren validate-config'.")
    }
}

// ── Allocation errors ─────────────────────────────────────────────────────────

/// One group of workspaces claiming the same resource value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    /// Which resource collided: `"backend port"`, `"frontend port"`,
    /// or `"database name"`.
    pub resource: &'static str,
    /// The colliding value, rendered as text.
    pub value: String,
    /// Every workspace name claiming the value (includes `main` when the
    /// implicit main workspace is involved).
    pub claimants: Vec<String>,
}

/// Two or more workspaces resolved to the same port or database name.
/// Fatal; detected eagerly at config-load time before any provisioning.
#[derive(Debug, Error)]
pub struct AllocationConflict {
    /// All conflicting groups across the registry.
    pub conflicts: Vec<ConflictGroup>,
}

impl std::fmt::Display for AllocationConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "allocation conflict:")?;
        for c in &self.conflicts {
            writeln!(
                f,
                "  - {} {} claimed by: {}",
                c.resource,
                c.value,
                c.claimants.join(", ")
            )?;
        }
        write!(
            f,
            "Assign explicit values in warren.yaml so every workspace is distinct."
        )
    }
}

// ── Environment synthesis errors ──────────────────────────────────────────────

/// Errors raised while synthesizing workspace environment files.
#[derive(Debug, Error)]
pub enum EnvSynthError {
    #[error(
        "required environment template missing: {path}\n\
         The backend app env file must exist before a workspace can be provisioned."
    )]
    MissingRequired { path: String },
}

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// A collaborator (container runtime, database server) is unreachable.
/// Fatal; raised before any mutation.
#[derive(Debug, Error)]
#[error("{what} unavailable: {detail}\nHint: {hint}")]
pub struct ResourceUnavailable {
    /// What was probed, e.g. `"docker"` or `"database container"`.
    pub what: &'static str,
    /// What the probe observed.
    pub detail: String,
    /// Suggested remediation command.
    pub hint: String,
}

// ── Service errors ────────────────────────────────────────────────────────────

/// A service failed to become healthy within its bounded startup window.
/// The workspace is left in `Unhealthy`; the recent log tail is attached
/// so the caller can see why without hunting for the log file.
#[derive(Debug, Error)]
pub struct ServiceTimeout {
    pub service: String,
    pub seconds: u64,
    pub log_tail: Vec<String>,
}

impl std::fmt::Display for ServiceTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} did not become healthy within {}s; recent log output:",
            self.service, self.seconds
        )?;
        for line in &self.log_tail {
            writeln!(f, "  | {line}")?;
        }
        write!(f, "Inspect the full log with 'warren logs <agent> {}'.", self.service)
    }
}
