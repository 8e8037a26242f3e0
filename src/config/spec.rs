//! Configuration specification types for the orchestrator.
//!
//! This module defines the structs that map to the optional `homestack.yaml`
//! file. Every field has a default, so a missing file behaves exactly like an
//! empty one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Root of the `<category>/<service>/<compose-file>` tree.
    pub services_root: PathBuf,
    /// File names recognized as compose declarations.
    pub compose_files: Vec<String>,
    /// Shared environment file lookup.
    pub environment: EnvironmentConfig,
    /// Static tier ordering.
    pub tiers: TierConfig,
    /// Settle delays between services.
    pub pacing: PacingConfig,
    /// Post-deploy health verification.
    pub health: HealthConfig,
    /// Deployment engine behaviour.
    pub deploy: DeployConfig,
    /// Deployment history journal.
    pub history: HistoryConfig,
    /// Image update checker.
    pub updates: UpdatesConfig,
}

/// Shared environment file lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Name of the environment file in every candidate directory.
    pub file_name: String,
    /// Conventional CI workspace mount.
    pub workspace_mount: PathBuf,
    /// Appdata base path on the production host.
    pub appdata_path: PathBuf,
    /// Environment variable holding the CI workspace path.
    pub workspace_var: String,
    /// Ancestor directory, relative to the working directory.
    pub ancestor: PathBuf,
}

/// Static tier ordering. Entries are `category/name` service paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TierConfig {
    /// Infrastructure tier, deployed first, in this order.
    pub infrastructure: Vec<String>,
    /// Core tier, deployed after infrastructure, in this order.
    pub core: Vec<String>,
}

/// Settle delays inserted after each service, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay after each infrastructure service.
    pub infrastructure_secs: u64,
    /// Delay after each core service.
    pub core_secs: u64,
    /// Delay between application services.
    pub application_secs: u64,
}

/// Health verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    /// Poll interval in seconds.
    pub interval_secs: u64,
    /// Total wait budget in seconds.
    pub timeout_secs: u64,
    /// Log lines surfaced when a service ends degraded.
    pub log_tail: u32,
}

/// Deployment engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    /// Graceful stop timeout in seconds.
    pub stop_timeout_secs: u64,
    /// Upper bound for any single compose/runtime command, in seconds.
    pub command_timeout_secs: u64,
    /// Maximum application services deployed at once with `--parallel`.
    pub parallelism: usize,
    /// Stop later tiers when infrastructure or core services fail.
    pub halt_on_tier_failure: bool,
}

/// History journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Journal file; defaults to the user data directory.
    pub path: Option<PathBuf>,
    /// Number of runs kept.
    pub keep: usize,
}

/// Image update checker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdatesConfig {
    /// Docker Hub API base URL.
    pub registry_url: String,
    /// GitHub API base URL.
    pub github_url: String,
    /// Image name to GitHub `owner/repo`, for changelogs.
    pub changelog_repos: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            services_root: PathBuf::from("services"),
            compose_files: DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect(),
            environment: EnvironmentConfig::default(),
            tiers: TierConfig::default(),
            pacing: PacingConfig::default(),
            health: HealthConfig::default(),
            deploy: DeployConfig::default(),
            history: HistoryConfig::default(),
            updates: UpdatesConfig::default(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            file_name: String::from(".env"),
            workspace_mount: PathBuf::from("/workspace"),
            appdata_path: PathBuf::from("/mnt/user/appdata/homestack"),
            workspace_var: String::from("GITHUB_WORKSPACE"),
            ancestor: PathBuf::from(".."),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            infrastructure_secs: 5,
            core_secs: 3,
            application_secs: 2,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 120,
            log_tail: 50,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 30,
            command_timeout_secs: 600,
            parallelism: 4,
            halt_on_tier_failure: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { path: None, keep: 200 }
    }
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            registry_url: String::from("https://registry.hub.docker.com"),
            github_url: String::from("https://api.github.com"),
            changelog_repos: BTreeMap::new(),
        }
    }
}

/// Compose declaration names recognized by default.
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

impl PacingConfig {
    /// Delay after each infrastructure service.
    #[must_use]
    pub const fn infrastructure(&self) -> Duration {
        Duration::from_secs(self.infrastructure_secs)
    }

    /// Delay after each core service.
    #[must_use]
    pub const fn core(&self) -> Duration {
        Duration::from_secs(self.core_secs)
    }

    /// Delay between application services.
    #[must_use]
    pub const fn application(&self) -> Duration {
        Duration::from_secs(self.application_secs)
    }
}

impl HealthConfig {
    /// Poll interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Total wait budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DeployConfig {
    /// Graceful stop timeout.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Upper bound for a single external command.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl TierConfig {
    /// Returns true if the service path is listed in either static tier.
    #[must_use]
    pub fn contains(&self, service_path: &str) -> bool {
        self.infrastructure.iter().any(|s| s == service_path)
            || self.core.iter().any(|s| s == service_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: OrchestratorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.health.interval(), Duration::from_secs(5));
        assert_eq!(config.health.timeout(), Duration::from_secs(120));
        assert_eq!(config.pacing.infrastructure(), Duration::from_secs(5));
        assert_eq!(config.pacing.core(), Duration::from_secs(3));
        assert_eq!(config.pacing.application(), Duration::from_secs(2));
        assert_eq!(config.deploy.stop_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let yaml = r"
health:
  timeout_secs: 300
tiers:
  infrastructure:
    - networking/traefik
";
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.health.timeout_secs, 300);
        assert_eq!(config.health.interval_secs, 5);
        assert!(config.tiers.contains("networking/traefik"));
        assert!(!config.tiers.contains("media/plex"));
        assert_eq!(config.compose_files.len(), 4);
    }
}
