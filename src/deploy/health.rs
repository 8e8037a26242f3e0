//! Post-deploy health verification.
//!
//! Polls the containers of a service at a fixed interval until every one of
//! them has settled healthy, or the wait budget runs out. Running out of
//! budget degrades the outcome but never fails it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::compose::{
    ComposeDriver, ComposeProject, ContainerObservation, ContainerRuntime, HealthProbe,
    RuntimeStatus,
};

use super::outcome::HealthVerdict;

/// Classified state of one container on one poll.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerHealth {
    /// Running and its probe passes.
    Healthy,
    /// Running without a declared probe.
    NoCheckDeclared,
    /// Running, probe still in its start period.
    Starting,
    /// Running, probe failing.
    Unhealthy,
    /// Being restarted by its restart policy.
    Restarting,
    /// Created but not yet started.
    Created,
    /// Paused.
    Paused,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// Seen on an earlier poll, gone now.
    Vanished,
    /// Status not recognized.
    Unknown,
}

/// One container with its classified state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClassifiedContainer {
    /// Container name.
    pub name: String,
    /// Classified state.
    pub health: ContainerHealth,
}

/// Counts of one poll.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HealthTally {
    /// Containers observed, vanished ones included.
    pub total: usize,
    /// Healthy or without a declared check.
    pub healthy: usize,
    /// Still warming up.
    pub transient: usize,
    /// Unhealthy, stopped or gone.
    pub unhealthy: usize,
    /// Per-container detail.
    pub containers: Vec<ClassifiedContainer>,
}

/// Result of one verification.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Final verdict.
    pub verdict: HealthVerdict,
    /// Counts of the last poll.
    pub tally: HealthTally,
    /// Number of polls performed.
    pub polls: u32,
    /// Time spent verifying.
    #[serde(skip)]
    pub elapsed: Duration,
    /// Recent service logs, collected when the verdict is degraded.
    pub recent_logs: Option<String>,
}

/// Polls a service's containers until they settle.
#[derive(Clone)]
pub struct HealthVerifier {
    /// Compose adapter for per-service observations.
    driver: Arc<dyn ComposeDriver>,
    /// Runtime adapter for the name-pattern fallback and inspection.
    runtime: Arc<dyn ContainerRuntime>,
    /// Poll interval.
    interval: Duration,
    /// Log lines collected on a degraded verdict.
    log_tail: u32,
}

impl ContainerHealth {
    /// Classifies one observation.
    #[must_use]
    pub const fn classify(observation: &ContainerObservation) -> Self {
        match observation.status {
            RuntimeStatus::Running => match observation.health {
                HealthProbe::Healthy => Self::Healthy,
                HealthProbe::None => Self::NoCheckDeclared,
                HealthProbe::Starting => Self::Starting,
                HealthProbe::Unhealthy => Self::Unhealthy,
            },
            RuntimeStatus::Restarting => Self::Restarting,
            RuntimeStatus::Created => Self::Created,
            RuntimeStatus::Paused => Self::Paused,
            RuntimeStatus::Removing => Self::Removing,
            RuntimeStatus::Exited => Self::Exited,
            RuntimeStatus::Dead => Self::Dead,
            RuntimeStatus::Unknown => Self::Unknown,
        }
    }

    /// Expected warm-up states. Never counted as unhealthy.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Starting | Self::Restarting)
    }

    /// Settled and serving.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy | Self::NoCheckDeclared)
    }

    /// Counted toward the unhealthy total immediately.
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        !self.is_transient() && !self.is_healthy()
    }
}

impl std::fmt::Display for ContainerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Healthy => "running-healthy",
            Self::NoCheckDeclared => "running-no-check",
            Self::Starting => "running-starting",
            Self::Unhealthy => "running-unhealthy",
            Self::Restarting => "restarting",
            Self::Created => "created",
            Self::Paused => "paused",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Vanished => "vanished",
            Self::Unknown => "unknown",
        };
        write!(f, "{state}")
    }
}

impl HealthTally {
    /// Builds a tally from classified containers.
    #[must_use]
    pub fn from_containers(containers: Vec<ClassifiedContainer>) -> Self {
        let mut tally = Self {
            total: containers.len(),
            ..Self::default()
        };

        for container in &containers {
            if container.health.is_healthy() {
                tally.healthy += 1;
            } else if container.health.is_transient() {
                tally.transient += 1;
            } else {
                tally.unhealthy += 1;
            }
        }

        tally.containers = containers;
        tally
    }

    /// Classifies and tallies raw observations.
    #[must_use]
    pub fn from_observations(observations: &[ContainerObservation]) -> Self {
        Self::from_containers(
            observations
                .iter()
                .map(|o| ClassifiedContainer {
                    name: o.name.clone(),
                    health: ContainerHealth::classify(o),
                })
                .collect(),
        )
    }

    /// At least one container, none unhealthy, none still warming up.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.total > 0 && self.unhealthy == 0 && self.transient == 0
    }

    /// Names of the unhealthy containers.
    #[must_use]
    pub fn unhealthy_names(&self) -> Vec<&str> {
        self.containers
            .iter()
            .filter(|c| c.health.is_unhealthy())
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl std::fmt::Display for HealthTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} healthy, {} starting, {} unhealthy",
            self.healthy, self.total, self.transient, self.unhealthy
        )
    }
}

impl std::fmt::Debug for HealthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthVerifier")
            .field("interval", &self.interval)
            .field("log_tail", &self.log_tail)
            .finish_non_exhaustive()
    }
}

impl HealthVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        driver: Arc<dyn ComposeDriver>,
        runtime: Arc<dyn ContainerRuntime>,
        interval: Duration,
        log_tail: u32,
    ) -> Self {
        Self {
            driver,
            runtime,
            interval,
            log_tail,
        }
    }

    /// Polls until every container settles or `budget` runs out.
    ///
    /// Returns as soon as a poll finds no unhealthy and no transient
    /// container, with at least one container observed.
    pub async fn verify(&self, project: &ComposeProject, budget: Duration) -> HealthReport {
        let started = Instant::now();
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        let mut polls = 0u32;
        let mut ever_observed = false;

        let tally = loop {
            polls += 1;
            let tally = HealthTally::from_containers(self.observe(project, &mut seen).await);
            ever_observed |= tally.total > 0;

            debug!("{} health poll {polls}: {tally}", project.service);

            if tally.is_settled() {
                return HealthReport {
                    verdict: HealthVerdict::Healthy,
                    tally,
                    polls,
                    elapsed: started.elapsed(),
                    recent_logs: None,
                };
            }

            let elapsed = started.elapsed();
            if elapsed >= budget {
                break tally;
            }
            tokio::time::sleep(self.interval.min(budget - elapsed)).await;
        };

        if !ever_observed {
            warn!(
                "No containers found for {} (pattern '{}')",
                project.service, project.project_name
            );
            return HealthReport {
                verdict: HealthVerdict::Unknown,
                tally,
                polls,
                elapsed: started.elapsed(),
                recent_logs: None,
            };
        }

        warn!(
            "{} did not settle within {}s: {tally}",
            project.service,
            budget.as_secs()
        );
        let recent_logs = match self.driver.logs(project, self.log_tail).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!("Cannot collect logs for {}: {e}", project.service);
                None
            }
        };

        HealthReport {
            verdict: HealthVerdict::Degraded,
            tally,
            polls,
            elapsed: started.elapsed(),
            recent_logs,
        }
    }

    /// Observes the service once.
    ///
    /// Falls back to a name-pattern match when the compose tool reports no
    /// containers. Containers seen earlier but missing now are inspected and
    /// reported as vanished if the runtime no longer knows them.
    async fn observe(
        &self,
        project: &ComposeProject,
        seen: &mut BTreeMap<String, String>,
    ) -> Vec<ClassifiedContainer> {
        let mut observations = match self.driver.snapshot(project).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!("Snapshot of {} failed: {e}", project.service);
                Vec::new()
            }
        };

        if observations.is_empty() {
            debug!("No compose containers for {}, matching by name", project.service);
            match self.runtime.find_containers(&project.project_name).await {
                Ok(found) => observations = found,
                Err(e) => warn!("Name lookup for {} failed: {e}", project.service),
            }
        }

        let mut classified: Vec<ClassifiedContainer> = observations
            .iter()
            .map(|o| ClassifiedContainer {
                name: o.name.clone(),
                health: ContainerHealth::classify(o),
            })
            .collect();

        let missing: Vec<(String, String)> = seen
            .iter()
            .filter(|(id, _)| !observations.iter().any(|o| &o.id == *id))
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();

        for (id, name) in missing {
            let health = match self.runtime.inspect(&id).await {
                Ok(Some(observation)) => ContainerHealth::classify(&observation),
                Ok(None) => ContainerHealth::Vanished,
                Err(e) => {
                    debug!("Inspect of {name} failed: {e}");
                    ContainerHealth::Vanished
                }
            };
            classified.push(ClassifiedContainer { name, health });
        }

        for observation in observations {
            seen.insert(observation.id, observation.name);
        }

        classified
    }
}
