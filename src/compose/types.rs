//! Compose and container runtime types.
//!
//! These types describe what the orchestrator observes from the container
//! runtime. Observations are snapshots: they are never mutated, only
//! superseded by the next poll.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::environment::RuntimeEnvironment;
use crate::registry::ServiceDescriptor;

/// Runtime status of a container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    /// Container created but never started.
    Created,
    /// Container is running.
    Running,
    /// Container is being restarted by its restart policy.
    Restarting,
    /// Container is being removed.
    Removing,
    /// Container is paused.
    Paused,
    /// Container has exited.
    Exited,
    /// Container is dead.
    Dead,
    /// Status string not recognized.
    #[default]
    Unknown,
}

/// Health-probe status of a container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthProbe {
    /// No health check declared.
    #[default]
    None,
    /// Probe is in its start period.
    Starting,
    /// Probe passes.
    Healthy,
    /// Probe fails.
    Unhealthy,
}

/// Snapshot of one container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerObservation {
    /// Container ID.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Compose service the container belongs to, if known.
    #[serde(default)]
    pub service: Option<String>,
    /// Compose project the container belongs to, if known.
    #[serde(default)]
    pub project: Option<String>,
    /// Image reference.
    pub image: String,
    /// Runtime status.
    pub status: RuntimeStatus,
    /// Health-probe status.
    pub health: HealthProbe,
}

/// Everything the compose tool needs to address one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// `category/name` identifier.
    pub service: String,
    /// Compose project name.
    pub project_name: String,
    /// Service directory.
    pub directory: PathBuf,
    /// Compose declaration.
    pub compose_file: PathBuf,
    /// Shared environment file.
    pub env_file: PathBuf,
}

/// Result of pulling a service's images. A partial pull is not fatal.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PullReport {
    /// Images pulled successfully.
    pub pulled: Vec<String>,
    /// Images that failed to pull; cached copies are used.
    pub failed: Vec<String>,
}

/// Resource usage of one running container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerStats {
    /// Container name.
    pub name: String,
    /// CPU usage, as reported.
    pub cpu_percent: String,
    /// Memory usage / limit, as reported.
    pub memory_usage: String,
    /// Memory usage percentage, as reported.
    pub memory_percent: String,
}

/// Result of a system prune.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PruneReport {
    /// Space reclaimed, as reported by the runtime.
    pub reclaimed: String,
}

impl RuntimeStatus {
    /// Parses a runtime status string.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" | "up" => Self::Running,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl HealthProbe {
    /// Parses a health-probe status string. Empty means no check declared.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "starting" | "health: starting" => Self::Starting,
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            _ => Self::None,
        }
    }

    /// Extracts the probe status from a `docker ps` status column such as
    /// `Up 3 minutes (healthy)`.
    #[must_use]
    pub fn from_status_text(status: &str) -> Self {
        status
            .rfind('(')
            .and_then(|start| status[start + 1..].strip_suffix(')'))
            .map_or(Self::None, Self::parse)
    }
}

impl ComposeProject {
    /// Addresses a discovered service with the resolved environment file.
    #[must_use]
    pub fn new(descriptor: &ServiceDescriptor, environment: &RuntimeEnvironment) -> Self {
        Self {
            service: descriptor.id(),
            project_name: descriptor.project_name(),
            directory: descriptor.path.clone(),
            compose_file: descriptor.compose_file.clone(),
            env_file: environment.env_file.clone(),
        }
    }
}

impl ContainerObservation {
    /// Returns true if the compose project label names `project_name`.
    #[must_use]
    pub fn belongs_to(&self, project_name: &str) -> bool {
        self.project.as_deref() == Some(project_name)
    }
}

impl PullReport {
    /// Returns true if at least one image failed to pull.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Paused => "paused",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        };
        write!(f, "{status}")
    }
}

impl std::fmt::Display for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let probe = match self {
            Self::None => "-",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        };
        write!(f, "{probe}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_matches_project_label_exactly() {
        let container = |project: Option<&str>| ContainerObservation {
            id: String::from("c1"),
            name: String::from("media-plex-meta-manager-1"),
            service: None,
            project: project.map(String::from),
            image: String::from("meisnate12/plex-meta-manager:v1.21"),
            status: RuntimeStatus::Running,
            health: HealthProbe::None,
        };

        assert!(container(Some("media-plex-meta-manager")).belongs_to("media-plex-meta-manager"));
        assert!(!container(Some("media-plex-meta-manager")).belongs_to("media-plex"));
        assert!(!container(None).belongs_to("media-plex"));
    }

    #[test]
    fn test_runtime_status_parse() {
        assert_eq!(RuntimeStatus::parse("running"), RuntimeStatus::Running);
        assert_eq!(RuntimeStatus::parse(" Exited "), RuntimeStatus::Exited);
        assert_eq!(RuntimeStatus::parse("restarting"), RuntimeStatus::Restarting);
        assert_eq!(RuntimeStatus::parse("weird"), RuntimeStatus::Unknown);
    }

    #[test]
    fn test_health_from_status_text() {
        assert_eq!(HealthProbe::from_status_text("Up 3 minutes (healthy)"), HealthProbe::Healthy);
        assert_eq!(
            HealthProbe::from_status_text("Up 5 seconds (health: starting)"),
            HealthProbe::Starting
        );
        assert_eq!(HealthProbe::from_status_text("Up 2 hours (unhealthy)"), HealthProbe::Unhealthy);
        assert_eq!(HealthProbe::from_status_text("Up 2 hours"), HealthProbe::None);
        assert_eq!(HealthProbe::from_status_text("Exited (1) 3 minutes ago"), HealthProbe::None);
    }
}
