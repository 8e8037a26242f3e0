//! Adapter traits over the compose tool and the container runtime.
//!
//! Both traits are pure adapters: they report success or failure explicitly
//! and carry no deployment policy.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;

use super::types::{ComposeProject, ContainerObservation, ContainerStats, PruneReport, PullReport};

/// Per-service operations of the compose tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComposeDriver: Send + Sync {
    /// Validates the compose declaration. Must run before any mutation.
    async fn validate(&self, project: &ComposeProject) -> Result<()>;

    /// Pulls every image of the service. Per-image failures are reported in
    /// the returned [`PullReport`], not as an error.
    async fn pull(&self, project: &ComposeProject) -> Result<PullReport>;

    /// Image IDs the declaration resolves to locally (post-pull).
    async fn resolved_digests(&self, project: &ComposeProject) -> Result<BTreeSet<String>>;

    /// Image IDs backing the service's running containers.
    async fn running_digests(&self, project: &ComposeProject) -> Result<BTreeSet<String>>;

    /// Gracefully stops and removes the service's containers.
    async fn stop(&self, project: &ComposeProject, timeout: Duration) -> Result<()>;

    /// Brings the service up in the background.
    async fn start(&self, project: &ComposeProject) -> Result<()>;

    /// Observes every container of the service, including stopped ones.
    async fn snapshot(&self, project: &ComposeProject) -> Result<Vec<ContainerObservation>>;

    /// Returns the most recent log lines of the service.
    async fn logs(&self, project: &ComposeProject, tail: u32) -> Result<String>;
}

/// Host-wide operations of the container runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks that the daemon answers; returns its version.
    async fn ping(&self) -> Result<String>;

    /// Lists every container on the host.
    async fn list_containers(&self) -> Result<Vec<ContainerObservation>>;

    /// Lists containers whose name matches `pattern`.
    async fn find_containers(&self, pattern: &str) -> Result<Vec<ContainerObservation>>;

    /// Inspects one container; `None` if it no longer exists.
    async fn inspect(&self, id: &str) -> Result<Option<ContainerObservation>>;

    /// Takes a resource usage snapshot of the named running containers.
    async fn stats(&self, names: Vec<String>) -> Result<Vec<ContainerStats>>;

    /// Removes unused runtime data.
    async fn prune(&self, volumes: bool) -> Result<PruneReport>;

    /// Lists network names.
    async fn networks(&self) -> Result<Vec<String>>;

    /// Lists volume names.
    async fn volumes(&self) -> Result<Vec<String>>;
}

/// Graceful stop followed by start.
///
/// The stop is best-effort: a failure or timeout is logged and the start
/// still runs. Only a failed start is returned as an error.
///
/// # Errors
///
/// Returns an error if the service cannot be started.
pub async fn restart(
    driver: &dyn ComposeDriver,
    project: &ComposeProject,
    stop_timeout: Duration,
) -> Result<()> {
    debug!("Stopping {} (timeout {}s)", project.service, stop_timeout.as_secs());
    if let Err(e) = driver.stop(project, stop_timeout).await {
        warn!("Graceful stop of {} did not complete, starting anyway: {e}", project.service);
    }

    debug!("Starting {}", project.service);
    driver.start(project).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ComposeError, HomestackError};
    use std::path::PathBuf;

    fn project() -> ComposeProject {
        ComposeProject {
            service: String::from("media/plex"),
            project_name: String::from("plex"),
            directory: PathBuf::from("/srv/services/media/plex"),
            compose_file: PathBuf::from("/srv/services/media/plex/docker-compose.yml"),
            env_file: PathBuf::from("/srv/.env"),
        }
    }

    #[tokio::test]
    async fn test_restart_survives_stop_timeout() {
        let mut driver = MockComposeDriver::new();
        driver.expect_stop().times(1).returning(|_, _| {
            Err(HomestackError::Compose(ComposeError::Timeout {
                command: String::from("docker compose down"),
                secs: 30,
            }))
        });
        driver.expect_start().times(1).returning(|_| Ok(()));

        let result = restart(&driver, &project(), Duration::from_secs(30)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_restart_propagates_start_failure() {
        let mut driver = MockComposeDriver::new();
        driver.expect_stop().times(1).returning(|_, _| Ok(()));
        driver.expect_start().times(1).returning(|_| {
            Err(HomestackError::Compose(ComposeError::CommandFailed {
                command: String::from("docker compose up -d"),
                code: Some(1),
                stderr: String::from("port is already allocated"),
            }))
        });

        let result = restart(&driver, &project(), Duration::from_secs(30)).await;
        assert!(result.is_err());
    }
}
