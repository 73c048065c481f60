//! warren — workspace provisioning and isolation engine.
//!
//! Provisions N isolated development workspaces ("agents") over one
//! codebase: each gets its own git worktree, ports, database, and env
//! files, while sharing the project's docker infrastructure.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod allocator;
pub mod app;
pub mod cli;
pub mod command_runner;
pub mod commands;
pub mod config;
pub mod database;
pub mod docker;
pub mod envfile;
pub mod errors;
pub mod git;
pub mod health;
pub mod lifecycle;
pub mod output;
pub mod probe;
pub mod services;
pub mod synth;
pub mod workspace;
