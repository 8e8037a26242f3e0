//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Homestack - tiered, health-verified Docker Compose rollouts.
#[derive(Parser, Debug)]
#[command(name = "homestack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HOMESTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Shared environment file, bypassing the location search.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Services root, overriding the configuration.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show what would happen without changing anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy one service.
    Deploy {
        /// Service path, `category/name`.
        service: String,

        /// Restart even if no image changed.
        #[arg(short, long)]
        force: bool,

        /// Pull images only, do not restart.
        #[arg(long)]
        pull_only: bool,

        /// Health wait budget in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Deploy every service of a category.
    DeployCategory {
        /// Category name.
        category: String,

        /// Rollout flags.
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Deploy every discovered service, tier by tier.
    DeployAll {
        /// Rollout flags.
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Deploy the infrastructure and core tiers.
    DeployInfrastructure {
        /// Restart even if no image changed.
        #[arg(short, long)]
        force: bool,

        /// Stop after a failed infrastructure or core service.
        #[arg(long)]
        strict: bool,
    },

    /// Force-redeploy one service.
    Redeploy {
        /// Service path, `category/name`.
        service: String,
    },

    /// Show container status.
    Status {
        /// Service path; every service when omitted.
        service: Option<String>,
    },

    /// Check the health of every container on the host.
    Health,

    /// List discovered services.
    List {
        /// Only this category.
        #[arg(long)]
        category: Option<String>,
    },

    /// List service categories.
    ListCategories,

    /// Show recent logs of a service.
    Logs {
        /// Service path, `category/name`.
        service: String,

        /// Number of lines to show.
        #[arg(short, long, default_value = "100")]
        tail: u32,
    },

    /// Stop and remove a service's containers.
    Down {
        /// Service path, `category/name`.
        service: String,
    },

    /// Remove unused containers, networks and images.
    Cleanup {
        /// Remove unused volumes too.
        #[arg(long)]
        volumes: bool,
    },

    /// Validate the environment and every compose declaration.
    Validate,

    /// Check Docker Hub for newer image versions.
    CheckUpdates {
        /// Rewrite the image pins in place.
        #[arg(long)]
        write: bool,

        /// Append results to this CI environment file.
        #[arg(long, env = "GITHUB_ENV")]
        github_env: Option<PathBuf>,
    },

    /// Show recent deployment runs.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Write a configuration template.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
}

/// Flags shared by multi-service rollouts.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Restart even if no image changed.
    #[arg(short, long)]
    pub force: bool,

    /// Deploy application services concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Maximum concurrent deployments with `--parallel`.
    #[arg(short, long, requires = "parallel")]
    pub jobs: Option<usize>,

    /// Stop after a failed infrastructure or core service.
    #[arg(long)]
    pub strict: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Commands {
    /// Label recorded in the history journal for deploy-type commands.
    #[must_use]
    pub const fn journal_label(&self) -> Option<&'static str> {
        match self {
            Self::Deploy { .. } => Some("deploy"),
            Self::DeployCategory { .. } => Some("deploy-category"),
            Self::DeployAll { .. } => Some("deploy-all"),
            Self::DeployInfrastructure { .. } => Some("deploy-infrastructure"),
            Self::Redeploy { .. } => Some("redeploy"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_all_flags() {
        let cli = Cli::try_parse_from([
            "homestack",
            "deploy-all",
            "--parallel",
            "--jobs",
            "3",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.dry_run);
        match cli.command {
            Commands::DeployAll { batch } => {
                assert!(batch.parallel);
                assert_eq!(batch.jobs, Some(3));
                assert!(!batch.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_jobs_requires_parallel() {
        assert!(Cli::try_parse_from(["homestack", "deploy-all", "--jobs", "3"]).is_err());
    }

    #[test]
    fn test_journal_labels() {
        let cli = Cli::try_parse_from(["homestack", "redeploy", "media/plex"]).unwrap();
        assert_eq!(cli.command.journal_label(), Some("redeploy"));

        let cli = Cli::try_parse_from(["homestack", "status"]).unwrap();
        assert_eq!(cli.command.journal_label(), None);
    }
}
