//! Command implementations

pub mod create;
pub mod delete;
pub mod health;
pub mod logs;
pub mod services;
pub mod status;
pub mod sync;
pub mod validate_config;
