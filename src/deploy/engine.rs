//! Per-service deployment state machine.
//!
//! `Validating -> Pulling -> DecidingRestart -> (Skipped) | Stopping ->
//! Starting -> VerifyingHealth -> Done`, aborting on validation or start
//! failure. A restart is needed only when the image IDs the declaration
//! resolves to after the pull differ from the ones backing the running
//! containers, unless forced.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::compose::{self, ComposeDriver, ComposeProject, ContainerRuntime};
use crate::config::{DeclarationHasher, OrchestratorConfig};
use crate::environment::RuntimeEnvironment;
use crate::error::{ComposeError, HomestackError, RegistryError};
use crate::registry::{ServiceDescriptor, ServiceRegistry};

use super::health::HealthVerifier;
use super::outcome::{DeploymentOutcome, FailureReason, HealthVerdict};

/// Deployment state machine phases, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    /// Checking the compose declaration.
    Validating,
    /// Pulling images.
    Pulling,
    /// Comparing running and pulled image IDs.
    DecidingRestart,
    /// Gracefully stopping the running containers.
    Stopping,
    /// Bringing the service up.
    Starting,
    /// Polling container health.
    VerifyingHealth,
    /// Finished.
    Done,
    /// Aborted on a fatal error.
    Aborted,
}

/// Per-invocation deployment switches.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Restart even when the image IDs are unchanged.
    pub force: bool,
    /// Stop after pulling.
    pub pull_only: bool,
    /// Validate only, change nothing.
    pub dry_run: bool,
    /// Overrides the configured health wait budget.
    pub health_timeout: Option<Duration>,
}

/// Result of deploying one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    /// `category/name` identifier, or the argument as given if unresolved.
    pub service: String,
    /// Terminal outcome.
    #[serde(flatten)]
    pub outcome: DeploymentOutcome,
    /// Images that failed to pull.
    pub pull_failures: Vec<String>,
    /// Fingerprint of the compose declaration.
    pub declaration_hash: Option<String>,
    /// Wall time spent on the service.
    pub elapsed_ms: u64,
    /// Recent logs collected on start failure or degraded health.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_logs: Option<String>,
}

/// Deploys single services.
#[derive(Clone)]
pub struct DeploymentEngine {
    /// Service lookup.
    registry: ServiceRegistry,
    /// Resolved shared environment file.
    environment: RuntimeEnvironment,
    /// Compose adapter.
    driver: Arc<dyn ComposeDriver>,
    /// Post-deploy health verifier.
    verifier: HealthVerifier,
    /// Declaration fingerprinting.
    hasher: Arc<DeclarationHasher>,
    /// Graceful stop timeout.
    stop_timeout: Duration,
    /// Default health wait budget.
    health_timeout: Duration,
    /// Log lines dumped on start failure.
    log_tail: u32,
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Validating => "validating",
            Self::Pulling => "pulling",
            Self::DecidingRestart => "deciding restart",
            Self::Stopping => "stopping",
            Self::Starting => "starting",
            Self::VerifyingHealth => "verifying health",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        write!(f, "{phase}")
    }
}

impl DeployOptions {
    /// Options for a forced redeploy.
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

impl ServiceReport {
    /// Creates a report carrying only an outcome.
    #[must_use]
    pub fn new(service: impl Into<String>, outcome: DeploymentOutcome) -> Self {
        Self {
            service: service.into(),
            outcome,
            pull_failures: Vec::new(),
            declaration_hash: None,
            elapsed_ms: 0,
            recent_logs: None,
        }
    }
}

impl std::fmt::Debug for DeploymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentEngine")
            .field("registry", &self.registry)
            .field("environment", &self.environment)
            .field("verifier", &self.verifier)
            .field("stop_timeout", &self.stop_timeout)
            .field("health_timeout", &self.health_timeout)
            .finish_non_exhaustive()
    }
}

impl DeploymentEngine {
    /// Creates an engine with default timings.
    #[must_use]
    pub fn new(
        registry: ServiceRegistry,
        environment: RuntimeEnvironment,
        driver: Arc<dyn ComposeDriver>,
        verifier: HealthVerifier,
    ) -> Self {
        Self {
            registry,
            environment,
            driver,
            verifier,
            hasher: Arc::new(DeclarationHasher::new()),
            stop_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(120),
            log_tail: 50,
        }
    }

    /// Builds an engine from the tool configuration.
    #[must_use]
    pub fn from_config(
        config: &OrchestratorConfig,
        environment: RuntimeEnvironment,
        driver: Arc<dyn ComposeDriver>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let registry = ServiceRegistry::new(&config.services_root, config.compose_files.clone());
        let verifier = HealthVerifier::new(
            Arc::clone(&driver),
            runtime,
            config.health.interval(),
            config.health.log_tail,
        );

        Self::new(registry, environment, driver, verifier)
            .with_stop_timeout(config.deploy.stop_timeout())
            .with_health_timeout(config.health.timeout())
            .with_log_tail(config.health.log_tail)
    }

    /// Sets the graceful stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the default health wait budget.
    #[must_use]
    pub const fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Sets the number of log lines dumped on failure.
    #[must_use]
    pub const fn with_log_tail(mut self, lines: u32) -> Self {
        self.log_tail = lines;
        self
    }

    /// Returns the service registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Returns the compose adapter.
    #[must_use]
    pub fn driver(&self) -> &dyn ComposeDriver {
        self.driver.as_ref()
    }

    /// Addresses a service for the compose tool.
    #[must_use]
    pub fn project(&self, descriptor: &ServiceDescriptor) -> ComposeProject {
        ComposeProject::new(descriptor, &self.environment)
    }

    /// Resolves a service argument and deploys it.
    ///
    /// A missing service directory or declaration yields
    /// `Failed(PathNotFound)` without touching the runtime.
    pub async fn deploy(&self, service: &str, options: &DeployOptions) -> ServiceReport {
        match self.registry.resolve(service) {
            Ok(descriptor) => self.deploy_descriptor(&descriptor, options).await,
            Err(e) => {
                error!("Cannot deploy {service}: {e}");
                let reason = match e {
                    HomestackError::Registry(RegistryError::AmbiguousDeclaration { .. }) => {
                        FailureReason::Validation(e.to_string())
                    }
                    _ => FailureReason::PathNotFound(e.to_string()),
                };
                ServiceReport::new(service, DeploymentOutcome::failed(reason))
            }
        }
    }

    /// Deploys a discovered service.
    pub async fn deploy_descriptor(
        &self,
        descriptor: &ServiceDescriptor,
        options: &DeployOptions,
    ) -> ServiceReport {
        let started = Instant::now();
        let id = descriptor.id();
        let project = self.project(descriptor);

        let mut report = ServiceReport::new(&id, DeploymentOutcome::DryRun);
        report.declaration_hash = match self.hasher.hash_file(&id, &descriptor.compose_file).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                debug!("Cannot fingerprint {id}: {e}");
                None
            }
        };

        let outcome = self.run(&project, options, &mut report).await;
        report.outcome = outcome;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if report.outcome.is_fatal() {
            Self::enter(&id, DeployPhase::Aborted);
        } else {
            Self::enter(&id, DeployPhase::Done);
        }
        info!("{id}: {}", report.outcome);
        report
    }

    /// Runs the state machine for one service.
    async fn run(
        &self,
        project: &ComposeProject,
        options: &DeployOptions,
        report: &mut ServiceReport,
    ) -> DeploymentOutcome {
        let id = &project.service;

        Self::enter(id, DeployPhase::Validating);
        if let Err(e) = self.driver.validate(project).await {
            error!("{id}: {e}");
            let detail = match e {
                HomestackError::Compose(ComposeError::SyntaxError { detail, .. }) => detail,
                other => other.to_string(),
            };
            return DeploymentOutcome::failed(FailureReason::Validation(detail));
        }

        if options.dry_run {
            info!("[dry-run] {id}: declaration valid, nothing changed");
            return DeploymentOutcome::DryRun;
        }

        // Baseline before the pull replaces local tags.
        let running = match self.driver.running_digests(project).await {
            Ok(digests) => Some(digests),
            Err(e) => {
                warn!("{id}: cannot read running images, assuming a restart is needed: {e}");
                None
            }
        };

        Self::enter(id, DeployPhase::Pulling);
        match self.driver.pull(project).await {
            Ok(pull) => {
                if pull.is_partial() {
                    warn!(
                        "{id}: {} image(s) failed to pull, using cached copies: {}",
                        pull.failed.len(),
                        pull.failed.join(", ")
                    );
                }
                report.pull_failures = pull.failed;
            }
            Err(e) => warn!("{id}: pull failed, using cached images: {e}"),
        }

        if options.pull_only {
            info!("{id}: images pulled, leaving containers untouched");
            return DeploymentOutcome::PulledOnly;
        }

        Self::enter(id, DeployPhase::DecidingRestart);
        let fresh_start = running.as_ref().is_some_and(BTreeSet::is_empty);

        if fresh_start {
            info!("{id}: no running containers, starting");
            Self::enter(id, DeployPhase::Starting);
            if let Err(e) = self.driver.start(project).await {
                return self.start_failed(project, &e, report).await;
            }
            let health = self.verify(project, options, report).await;
            return DeploymentOutcome::Started { health };
        }

        if options.force {
            debug!("{id}: forced restart");
        } else if let Some(running) = &running {
            if self.images_unchanged(project, running).await {
                info!("{id}: running images are current, skipping restart");
                return DeploymentOutcome::Skipped;
            }
        }

        Self::enter(id, DeployPhase::Stopping);
        Self::enter(id, DeployPhase::Starting);
        if let Err(e) = compose::restart(self.driver.as_ref(), project, self.stop_timeout).await {
            return self.start_failed(project, &e, report).await;
        }

        let health = self.verify(project, options, report).await;
        DeploymentOutcome::Restarted { health }
    }

    /// Compares pulled image IDs with the running ones.
    async fn images_unchanged(&self, project: &ComposeProject, running: &BTreeSet<String>) -> bool {
        match self.driver.resolved_digests(project).await {
            Ok(resolved) => {
                debug!(
                    "{}: running {:?}, resolved {:?}",
                    project.service, running, resolved
                );
                &resolved == running
            }
            Err(e) => {
                warn!("{}: cannot resolve pulled images: {e}", project.service);
                false
            }
        }
    }

    /// Polls health and keeps recent logs on a degraded verdict.
    async fn verify(
        &self,
        project: &ComposeProject,
        options: &DeployOptions,
        report: &mut ServiceReport,
    ) -> HealthVerdict {
        Self::enter(&project.service, DeployPhase::VerifyingHealth);
        let budget = options.health_timeout.unwrap_or(self.health_timeout);
        let health = self.verifier.verify(project, budget).await;

        if let Some(logs) = &health.recent_logs {
            warn!("{}: recent logs:\n{logs}", project.service);
        }
        report.recent_logs = health.recent_logs;
        health.verdict
    }

    /// Dumps recent logs after a failed start.
    async fn start_failed(
        &self,
        project: &ComposeProject,
        cause: &HomestackError,
        report: &mut ServiceReport,
    ) -> DeploymentOutcome {
        error!("{}: failed to start: {cause}", project.service);

        match self.driver.logs(project, self.log_tail).await {
            Ok(logs) => {
                error!("{}: recent logs:\n{logs}", project.service);
                report.recent_logs = Some(logs);
            }
            Err(e) => debug!("{}: no logs available: {e}", project.service),
        }

        DeploymentOutcome::failed(FailureReason::Start(cause.to_string()))
    }

    fn enter(service: &str, phase: DeployPhase) {
        debug!("{service}: {phase}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{
        ContainerObservation, HealthProbe, MockComposeDriver, MockContainerRuntime, PullReport,
        RuntimeStatus,
    };
    use crate::config::DEFAULT_COMPOSE_FILES;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn add_service(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
    }

    fn engine(root: &Path, driver: MockComposeDriver) -> DeploymentEngine {
        let registry = ServiceRegistry::new(
            root,
            DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect(),
        );
        let environment = RuntimeEnvironment {
            env_file: PathBuf::from("/srv/.env"),
            source: String::from("test"),
            variable_count: 3,
        };
        let driver: Arc<dyn ComposeDriver> = Arc::new(driver);
        let verifier = HealthVerifier::new(
            Arc::clone(&driver),
            Arc::new(MockContainerRuntime::new()),
            Duration::from_secs(5),
            20,
        );
        DeploymentEngine::new(registry, environment, driver, verifier)
    }

    fn digests(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    fn healthy_snapshot(driver: &mut MockComposeDriver) {
        driver.expect_snapshot().returning(|_| {
            Ok(vec![ContainerObservation {
                id: String::from("c1"),
                name: String::from("app"),
                service: None,
                project: None,
                image: String::from("app:1"),
                status: RuntimeStatus::Running,
                health: HealthProbe::Healthy,
            }])
        });
    }

    fn pulled(images: &[&str]) -> PullReport {
        PullReport {
            pulled: images.iter().map(|s| (*s).to_string()).collect(),
            failed: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_declaration_touches_nothing() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("media/plex")).unwrap();

        // No expectations: any driver call panics.
        let engine = engine(temp.path(), MockComposeDriver::new());
        let report = engine.deploy("media/plex", &DeployOptions::default()).await;

        assert!(matches!(
            report.outcome,
            DeploymentOutcome::Failed {
                reason: FailureReason::PathNotFound(_)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_running_goes_straight_to_start() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/alpha");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().times(1).returning(|_| Ok(()));
        driver.expect_running_digests().returning(|_| Ok(BTreeSet::new()));
        driver
            .expect_pull()
            .times(1)
            .returning(|_| Ok(pulled(&["alpha:2", "redis:7"])));
        driver.expect_resolved_digests().never();
        driver.expect_stop().never();
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/alpha", &DeployOptions::default())
            .await;

        assert_eq!(
            report.outcome,
            DeploymentOutcome::Started {
                health: HealthVerdict::Healthy
            }
        );
        assert!(report.declaration_hash.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_digests_skip_restart() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/beta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_pull().returning(|_| Ok(pulled(&["beta:1"])));
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_stop().never();
        driver.expect_start().never();

        let report = engine(temp.path(), driver)
            .deploy("apps/beta", &DeployOptions::default())
            .await;

        assert_eq!(report.outcome, DeploymentOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_restarts_regardless_of_digests() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/beta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_pull().returning(|_| Ok(pulled(&["beta:1"])));
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_stop().times(1).returning(|_, _| Ok(()));
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/beta", &DeployOptions::forced())
            .await;

        assert_eq!(
            report.outcome,
            DeploymentOutcome::Restarted {
                health: HealthVerdict::Healthy
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_digest_restarts() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/beta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_pull().returning(|_| Ok(pulled(&["beta:2"])));
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:Y"])));
        driver
            .expect_stop()
            .withf(|_, timeout| *timeout == Duration::from_secs(30))
            .times(1)
            .returning(|_, _| Ok(()));
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/beta", &DeployOptions::default())
            .await;

        assert!(matches!(report.outcome, DeploymentOutcome::Restarted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_pull_still_restarts_and_records_failures() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/beta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:X", "sha:S"])));
        driver.expect_pull().returning(|_| {
            Ok(PullReport {
                pulled: vec![String::from("beta:2")],
                failed: vec![String::from("sidecar:1")],
            })
        });
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:Y", "sha:S"])));
        driver.expect_stop().times(1).returning(|_, _| Ok(()));
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/beta", &DeployOptions::default())
            .await;

        assert_eq!(
            report.outcome,
            DeploymentOutcome::Restarted {
                health: HealthVerdict::Healthy
            }
        );
        assert_eq!(report.pull_failures, vec!["sidecar:1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pull_falls_back_to_cached_images() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/beta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:X"])));
        driver.expect_pull().returning(|_| {
            Err(ComposeError::CommandFailed {
                command: String::from("docker pull beta:2"),
                code: Some(1),
                stderr: String::from("registry unreachable"),
            }
            .into())
        });
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:Y"])));
        driver.expect_stop().times(1).returning(|_, _| Ok(()));
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/beta", &DeployOptions::default())
            .await;

        assert!(matches!(report.outcome, DeploymentOutcome::Restarted { .. }));
        assert!(!report.outcome.is_fatal());
        assert!(report.pull_failures.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/broken");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|p| {
            Err(ComposeError::SyntaxError {
                service: p.service.clone(),
                detail: String::from("services.web.ports must be a list"),
            }
            .into())
        });
        driver.expect_pull().never();
        driver.expect_start().never();

        let report = engine(temp.path(), driver)
            .deploy("apps/broken", &DeployOptions::default())
            .await;

        assert_eq!(
            report.outcome,
            DeploymentOutcome::failed(FailureReason::Validation(String::from(
                "services.web.ports must be a list"
            )))
        );
    }

    #[tokio::test]
    async fn test_start_failure_dumps_logs() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/gamma");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver.expect_running_digests().returning(|_| Ok(BTreeSet::new()));
        driver.expect_pull().returning(|_| Ok(PullReport::default()));
        driver.expect_start().returning(|_| {
            Err(ComposeError::CommandFailed {
                command: String::from("docker compose up -d"),
                code: Some(1),
                stderr: String::from("port is already allocated"),
            }
            .into())
        });
        driver
            .expect_logs()
            .times(1)
            .returning(|_, _| Ok(String::from("bind: address already in use")));
        driver.expect_snapshot().never();

        let report = engine(temp.path(), driver)
            .deploy("apps/gamma", &DeployOptions::default())
            .await;

        assert!(report.outcome.is_fatal());
        assert_eq!(report.outcome.label(), "failed-start");
        assert_eq!(report.recent_logs.as_deref(), Some("bind: address already in use"));
    }

    #[tokio::test]
    async fn test_pull_only_never_mutates() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/delta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:A"])));
        driver.expect_pull().returning(|_| {
            Ok(PullReport {
                pulled: vec![String::from("delta:3")],
                failed: vec![String::from("sidecar:1")],
            })
        });
        driver.expect_stop().never();
        driver.expect_start().never();

        let options = DeployOptions {
            pull_only: true,
            ..DeployOptions::default()
        };
        let report = engine(temp.path(), driver).deploy("apps/delta", &options).await;

        assert_eq!(report.outcome, DeploymentOutcome::PulledOnly);
        assert_eq!(report.pull_failures, vec!["sidecar:1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stop_still_starts() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/epsilon");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver
            .expect_running_digests()
            .returning(|_| Ok(digests(&["sha:A"])));
        driver.expect_pull().returning(|_| Ok(PullReport::default()));
        driver
            .expect_resolved_digests()
            .returning(|_| Ok(digests(&["sha:B"])));
        driver.expect_stop().returning(|_, _| {
            Err(ComposeError::Timeout {
                command: String::from("docker compose down"),
                secs: 30,
            }
            .into())
        });
        driver.expect_start().times(1).returning(|_| Ok(()));
        healthy_snapshot(&mut driver);

        let report = engine(temp.path(), driver)
            .deploy("apps/epsilon", &DeployOptions::default())
            .await;

        assert!(!report.outcome.is_fatal());
    }

    #[tokio::test]
    async fn test_dry_run_only_validates() {
        let temp = TempDir::new().unwrap();
        add_service(temp.path(), "apps/zeta");

        let mut driver = MockComposeDriver::new();
        driver.expect_validate().times(1).returning(|_| Ok(()));

        let options = DeployOptions {
            dry_run: true,
            ..DeployOptions::default()
        };
        let report = engine(temp.path(), driver).deploy("apps/zeta", &options).await;

        assert_eq!(report.outcome, DeploymentOutcome::DryRun);
    }
}
