//! CLI argument parsing with clap derive

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags};
use crate::commands;

/// Isolated parallel dev workspaces over one codebase
#[derive(Parser)]
#[command(
    name = "warren",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Answer yes to all prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision a new agent workspace end to end
    Create(commands::create::CreateArgs),

    /// Refresh an existing workspace's env files
    Sync(commands::sync::SyncArgs),

    /// Start workspace services
    Start(commands::services::ServiceArgs),

    /// Stop workspace services
    Stop(commands::services::ServiceArgs),

    /// Restart workspace services
    Restart(commands::services::ServiceArgs),

    /// Probe workspace health (backend, frontend, database)
    Health(commands::health::HealthArgs),

    /// Show all workspaces with their ports and service states
    Status,

    /// Validate the registry and report every allocation
    ValidateConfig,

    /// Tear a workspace down
    Delete(commands::delete::DeleteArgs),

    /// Show recent service logs
    Logs(commands::logs::LogsArgs),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            root,
            command,
        } = self;
        let ctx = AppContext::new(&AppFlags {
            no_color,
            quiet,
            json,
            yes,
            root,
        })?;
        match command {
            Command::Create(args) => commands::create::run(&ctx, &args).await,
            Command::Sync(args) => commands::sync::run(&ctx, &args).await,
            Command::Start(args) => {
                commands::services::run(&ctx, commands::services::Action::Start, &args).await
            }
            Command::Stop(args) => {
                commands::services::run(&ctx, commands::services::Action::Stop, &args).await
            }
            Command::Restart(args) => {
                commands::services::run(&ctx, commands::services::Action::Restart, &args).await
            }
            Command::Health(args) => commands::health::run(&ctx, &args).await,
            Command::Status => commands::status::run(&ctx).await,
            Command::ValidateConfig => commands::validate_config::run(&ctx),
            Command::Delete(args) => commands::delete::run(&ctx, &args).await,
            Command::Logs(args) => commands::logs::run(&ctx, &args).await,
        }
    }
}
