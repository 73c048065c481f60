//! Application context — unified state passed to every command handler.
//!
//! `AppContext` is constructed once in `Cli::run()` and passed as
//! `&AppContext` to all command handlers. Adding a new cross-cutting
//! concern requires only one field change here.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};
use crate::config::{LoadedRegistry, Registry};
use crate::docker::DockerCli;
use crate::output::OutputContext;
use crate::synth::OverwritePolicy;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
    /// Skip interactive prompts (also set by `CI` / `WARREN_YES` env vars).
    pub yes: bool,
    /// Project root override; defaults to the current directory.
    pub root: Option<PathBuf>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// External command executor.
    pub runner: TokioCommandRunner,
    /// Docker CLI wrapper.
    pub docker: DockerCli<TokioCommandRunner>,
    /// Root of the project this invocation operates on.
    pub project_root: PathBuf,
    /// When `true`, skip interactive prompts and use defaults.
    pub non_interactive: bool,
    /// Explicit consent to destructive defaults (`--yes` or `WARREN_YES`).
    /// `CI` alone sets `non_interactive` but never this.
    pub assume_yes: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let assume_yes = flags.yes || std::env::var("WARREN_YES").is_ok();
        let non_interactive = assume_yes || std::env::var("CI").is_ok();

        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        let project_root = match &flags.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("determining current directory")?,
        };

        Ok(Self {
            output: OutputContext::new(flags.no_color, flags.quiet),
            mode,
            runner: TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            docker: DockerCli::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT)),
            project_root,
            non_interactive,
            assume_yes,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Load the project registry (file or fallback) from the project root.
    ///
    /// # Errors
    ///
    /// Fails when `warren.yaml` exists but cannot be parsed.
    pub fn load_registry(&self) -> Result<LoadedRegistry> {
        Registry::load(&self.project_root)
    }

    /// How env synthesis should treat tracked target files. Force requires
    /// explicit consent; non-interactive runs without it (CI) skip tracked
    /// targets instead of clobbering them.
    #[must_use]
    pub fn overwrite_policy(&self) -> OverwritePolicy {
        if self.assume_yes {
            OverwritePolicy::Force
        } else if !self.non_interactive && self.output.is_tty {
            OverwritePolicy::Prompt
        } else {
            OverwritePolicy::Skip
        }
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `WARREN_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(assume_yes: bool, non_interactive: bool) -> AppContext {
        AppContext {
            output: OutputContext::new(true, true),
            mode: OutputMode::Human,
            runner: TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            docker: DockerCli::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT)),
            project_root: PathBuf::from("/tmp"),
            non_interactive,
            assume_yes,
        }
    }

    #[test]
    fn test_ci_alone_never_forces_overwrite() {
        // CI makes the run non-interactive but grants no consent to
        // clobber tracked files.
        let ctx = context(false, true);
        assert_eq!(ctx.overwrite_policy(), OverwritePolicy::Skip);
    }

    #[test]
    fn test_explicit_yes_forces_overwrite() {
        let ctx = context(true, true);
        assert_eq!(ctx.overwrite_policy(), OverwritePolicy::Force);
    }

    #[test]
    fn test_interactive_run_never_forces_silently() {
        // Prompt on a TTY, Skip otherwise; never Force without --yes.
        let ctx = context(false, false);
        assert_ne!(ctx.overwrite_policy(), OverwritePolicy::Force);
    }
}
