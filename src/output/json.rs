//! JSON output helpers.
//!
//! Provides the error-object formatter used by all `--json` code paths
//! when a command fails.

use anyhow::{Context, Result};

use crate::errors::{
    AllocationConflict, ConfigError, EnvSynthError, ResourceUnavailable, ServiceTimeout,
};

/// Stable machine-readable code for a failure, derived from the domain
/// error behind `err`. Errors without a domain type report `"failed"`.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if err.downcast_ref::<ConfigError>().is_some() {
        "invalid_config"
    } else if err.downcast_ref::<AllocationConflict>().is_some() {
        "allocation_conflict"
    } else if err.downcast_ref::<EnvSynthError>().is_some() {
        "env_synthesis_failed"
    } else if err.downcast_ref::<ResourceUnavailable>().is_some() {
        "resource_unavailable"
    } else if err.downcast_ref::<ServiceTimeout>().is_some() {
        "service_timeout"
    } else {
        "failed"
    }
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen in
/// practice — `serde_json` only fails on non-finite floats and maps with
/// non-string keys, neither of which appear here).
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
