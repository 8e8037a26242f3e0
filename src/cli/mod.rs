//! CLI module for the Homestack deployment tool.
//!
//! This module provides the command-line interface for rolling out
//! Docker Compose services.

mod commands;
mod output;

pub use commands::{BatchArgs, Cli, Commands, OutputFormat};
pub use output::{
    DeclarationCheck, HostStatus, OutputFormatter, ServiceOverview, ServiceStatus,
};
