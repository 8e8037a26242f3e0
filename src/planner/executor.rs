//! Tiered multi-service rollouts.
//!
//! Tiers run in rank order behind a barrier. Infrastructure and core
//! services deploy one at a time with a settle delay after each;
//! application services deploy one at a time with a short gap, or
//! concurrently on a bounded worker pool when parallel mode is on.
//! A service's fatal failure never aborts the batch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{OrchestratorConfig, PacingConfig, TierConfig};
use crate::deploy::{
    DeployOptions, DeploymentEngine, DeploymentOutcome, FailureReason, ServiceReport,
};
use crate::error::Result;

use super::plan::{PlanScope, RolloutPlan};
use super::report::BatchReport;
use super::tiers::{DeploymentTier, PlannedService, TierRank};

/// Batch switches.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Per-service switches.
    pub deploy: DeployOptions,
    /// Deploy the application tier concurrently.
    pub parallel: bool,
    /// Concurrency bound; the configured parallelism when unset.
    pub jobs: Option<usize>,
    /// Halt later tiers when an infrastructure or core service fails.
    pub strict: bool,
}

/// Plans and runs multi-service rollouts.
#[derive(Debug, Clone)]
pub struct OrchestrationPlanner {
    /// Shared single-service engine.
    engine: Arc<DeploymentEngine>,
    /// Static tier lists.
    tiers: TierConfig,
    /// Settle delays.
    pacing: PacingConfig,
    /// Default application-tier concurrency.
    parallelism: usize,
    /// Halt later tiers on infrastructure/core failure.
    halt_on_tier_failure: bool,
}

impl BatchOptions {
    /// Options for a plain sequential batch.
    #[must_use]
    pub fn new(deploy: DeployOptions) -> Self {
        Self {
            deploy,
            ..Self::default()
        }
    }
}

impl OrchestrationPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(engine: DeploymentEngine, tiers: TierConfig, pacing: PacingConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            tiers,
            pacing,
            parallelism: 1,
            halt_on_tier_failure: false,
        }
    }

    /// Creates a planner from the tool configuration.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig, engine: DeploymentEngine) -> Self {
        Self::new(engine, config.tiers.clone(), config.pacing.clone())
            .with_parallelism(config.deploy.parallelism)
            .with_halt_on_tier_failure(config.deploy.halt_on_tier_failure)
    }

    /// Sets the default application-tier concurrency.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets whether a failed infrastructure/core tier halts the rollout.
    #[must_use]
    pub const fn with_halt_on_tier_failure(mut self, halt: bool) -> Self {
        self.halt_on_tier_failure = halt;
        self
    }

    /// Returns the single-service engine.
    #[must_use]
    pub fn engine(&self) -> &DeploymentEngine {
        &self.engine
    }

    /// Builds the plan for `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be scanned.
    pub fn plan(&self, scope: &PlanScope) -> Result<RolloutPlan> {
        RolloutPlan::build(self.engine.registry(), &self.tiers, scope)
    }

    /// Deploys one service.
    pub async fn deploy_service(&self, service: &str, options: &DeployOptions) -> ServiceReport {
        self.engine.deploy(service, options).await
    }

    /// Deploys the infrastructure tier, then the core tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be scanned.
    pub async fn deploy_infrastructure(&self, options: &BatchOptions) -> Result<BatchReport> {
        let plan = self.plan(&PlanScope::Infrastructure)?;
        Ok(self.execute(&plan, options).await)
    }

    /// Deploys the infrastructure and core tiers, then every other service.
    ///
    /// # Errors
    ///
    /// Returns an error if the services root cannot be scanned.
    pub async fn deploy_all(&self, options: &BatchOptions) -> Result<BatchReport> {
        let plan = self.plan(&PlanScope::All)?;
        Ok(self.execute(&plan, options).await)
    }

    /// Deploys the services of one category, in tier order.
    ///
    /// # Errors
    ///
    /// Returns an error if the category cannot be scanned.
    pub async fn deploy_category(&self, category: &str, options: &BatchOptions) -> Result<BatchReport> {
        let plan = self.plan(&PlanScope::Category(category.to_string()))?;
        if plan.is_empty() {
            warn!("No services found in category '{category}'");
        }
        Ok(self.execute(&plan, options).await)
    }

    /// Runs a plan tier by tier.
    ///
    /// In dry-run mode nothing is executed: every planned service is
    /// reported as `DryRun`.
    pub async fn execute(&self, plan: &RolloutPlan, options: &BatchOptions) -> BatchReport {
        if options.deploy.dry_run {
            info!("[dry-run] {} services planned for {}", plan.len(), plan.scope);
            for tier in &plan.tiers {
                for service in &tier.services {
                    info!("[dry-run] {} {}", tier.rank, service.id);
                }
            }
            let reports = plan
                .tiers
                .iter()
                .flat_map(|t| t.services.iter())
                .map(|s| ServiceReport::new(&s.id, DeploymentOutcome::DryRun))
                .collect();
            return BatchReport::from_reports(reports);
        }

        let halt_enabled = (self.halt_on_tier_failure || options.strict) && !options.deploy.force;
        let mut reports = Vec::with_capacity(plan.len());
        let mut halted_by: Option<TierRank> = None;

        for tier in &plan.tiers {
            if let Some(rank) = halted_by {
                warn!("Skipping {} tier: {rank} tier failed", tier.rank);
                reports.extend(
                    tier.services
                        .iter()
                        .map(|s| ServiceReport::new(&s.id, DeploymentOutcome::Blocked)),
                );
                continue;
            }

            info!("Deploying {} tier ({} services)", tier.rank, tier.len());
            let tier_reports = if tier.rank == TierRank::Application && options.parallel {
                let jobs = options.jobs.unwrap_or(self.parallelism).max(1);
                self.run_parallel(tier, &options.deploy, jobs).await
            } else {
                self.run_sequential(tier, &options.deploy).await
            };

            let tier_failed = tier_reports.iter().any(|r| r.outcome.is_fatal());
            let batch = BatchReport::from_reports(tier_reports);
            info!("{} tier finished: {batch}", tier.rank);

            if tier_failed && halt_enabled && tier.rank.is_sequential() {
                error!("{} tier failed, halting later tiers", tier.rank);
                halted_by = Some(tier.rank);
            }
            reports.extend(batch.reports);
        }

        let batch = BatchReport::from_reports(reports);
        info!("Rollout of {} finished: {batch}", plan.scope);
        batch
    }

    /// Deploys a tier one service at a time.
    async fn run_sequential(&self, tier: &DeploymentTier, options: &DeployOptions) -> Vec<ServiceReport> {
        let delay = self.settle_delay(tier.rank);
        let mut reports = Vec::with_capacity(tier.len());

        for (index, service) in tier.services.iter().enumerate() {
            // Application services are spaced out; tier-0/1 services settle after each.
            if tier.rank == TierRank::Application && index > 0 {
                tokio::time::sleep(delay).await;
            }

            reports.push(deploy_planned(&self.engine, service, options).await);

            if tier.rank.is_sequential() {
                tokio::time::sleep(delay).await;
            }
        }

        reports
    }

    /// Deploys a tier with at most `jobs` services in flight.
    ///
    /// Launches are staggered by the application pacing delay. Reports come
    /// back in plan order regardless of completion order.
    async fn run_parallel(
        &self,
        tier: &DeploymentTier,
        options: &DeployOptions,
        jobs: usize,
    ) -> Vec<ServiceReport> {
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut tasks = JoinSet::new();

        for (index, service) in tier.services.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.pacing.application()).await;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let engine = Arc::clone(&self.engine);
            let service = service.clone();
            let options = options.clone();

            tasks.spawn(async move {
                let _permit = permit;
                (index, deploy_planned(&engine, &service, &options).await)
            });
        }

        let mut slots: Vec<Option<ServiceReport>> = (0..tier.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!("Deployment task failed: {e}"),
            }
        }

        slots
            .into_iter()
            .zip(&tier.services)
            .map(|(slot, service)| {
                slot.unwrap_or_else(|| {
                    ServiceReport::new(
                        &service.id,
                        DeploymentOutcome::failed(FailureReason::Start(String::from(
                            "deployment task aborted",
                        ))),
                    )
                })
            })
            .collect()
    }

    /// Settle delay for a tier.
    const fn settle_delay(&self, rank: TierRank) -> Duration {
        match rank {
            TierRank::Infrastructure => self.pacing.infrastructure(),
            TierRank::Core => self.pacing.core(),
            TierRank::Application => self.pacing.application(),
        }
    }
}

/// Deploys one planned service. Missing services resolve to `PathNotFound`.
async fn deploy_planned(
    engine: &DeploymentEngine,
    service: &PlannedService,
    options: &DeployOptions,
) -> ServiceReport {
    match &service.descriptor {
        Some(descriptor) => engine.deploy_descriptor(descriptor, options).await,
        None => engine.deploy(&service.id, options).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{
        ComposeDriver, ContainerObservation, HealthProbe, MockComposeDriver, MockContainerRuntime,
        PullReport, RuntimeStatus,
    };
    use crate::config::DEFAULT_COMPOSE_FILES;
    use crate::deploy::HealthVerifier;
    use crate::environment::RuntimeEnvironment;
    use crate::error::ComposeError;
    use crate::registry::ServiceRegistry;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn add_service(root: &Path, id: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
    }

    /// A driver where every service starts fresh; `failing` services refuse
    /// to start and `unhealthy` ones never settle. Start calls are recorded.
    fn driver(
        failing: &'static [&'static str],
        unhealthy: &'static [&'static str],
        started: Arc<Mutex<Vec<String>>>,
    ) -> MockComposeDriver {
        let mut driver = MockComposeDriver::new();
        driver.expect_validate().returning(|_| Ok(()));
        driver.expect_running_digests().returning(|_| Ok(BTreeSet::new()));
        driver.expect_pull().returning(|_| Ok(PullReport::default()));
        driver.expect_start().returning(move |project| {
            started.lock().unwrap().push(project.service.clone());
            if failing.contains(&project.service.as_str()) {
                Err(ComposeError::CommandFailed {
                    command: String::from("docker compose up -d"),
                    code: Some(1),
                    stderr: String::from("refused"),
                }
                .into())
            } else {
                Ok(())
            }
        });
        driver.expect_logs().returning(|_, _| Ok(String::new()));
        driver.expect_snapshot().returning(move |project| {
            let health = if unhealthy.contains(&project.service.as_str()) {
                HealthProbe::Unhealthy
            } else {
                HealthProbe::Healthy
            };
            Ok(vec![ContainerObservation {
                id: project.project_name.clone(),
                name: project.project_name.clone(),
                service: None,
                project: Some(project.project_name.clone()),
                image: String::from("img:1"),
                status: RuntimeStatus::Running,
                health,
            }])
        });
        driver
    }

    fn planner(root: &Path, driver: MockComposeDriver, tiers: TierConfig) -> OrchestrationPlanner {
        let registry = ServiceRegistry::new(
            root,
            DEFAULT_COMPOSE_FILES.iter().map(|s| (*s).to_string()).collect(),
        );
        let environment = RuntimeEnvironment {
            env_file: root.join(".env"),
            source: String::from("test"),
            variable_count: 0,
        };
        let driver: Arc<dyn ComposeDriver> = Arc::new(driver);
        let verifier = HealthVerifier::new(
            Arc::clone(&driver),
            Arc::new(MockContainerRuntime::new()),
            Duration::from_secs(5),
            10,
        );
        let engine = DeploymentEngine::new(registry, environment, driver, verifier)
            .with_health_timeout(Duration::from_secs(10));
        OrchestrationPlanner::new(engine, tiers, PacingConfig::default()).with_parallelism(2)
    }

    fn monitoring_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        for name in ["grafana", "loki", "prometheus", "promtail", "uptime-kuma"] {
            add_service(temp.path(), &format!("monitoring/{name}"));
        }
        temp
    }

    #[tokio::test(start_paused = true)]
    async fn test_category_continues_past_failure() {
        let temp = monitoring_tree();
        let started = Arc::new(Mutex::new(Vec::new()));
        let planner = planner(
            temp.path(),
            driver(&["monitoring/prometheus"], &[], Arc::clone(&started)),
            TierConfig::default(),
        );

        let batch = planner
            .deploy_category("monitoring", &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(batch.total(), 5);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.deployed, 4);
        assert_eq!(batch.failures()[0].service, "monitoring/prometheus");
        assert_eq!(started.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_counts_as_deployed() {
        let temp = monitoring_tree();
        let planner = planner(
            temp.path(),
            driver(&["monitoring/loki"], &["monitoring/grafana"], Arc::default()),
            TierConfig::default(),
        );

        let batch = planner.deploy_all(&BatchOptions::default()).await.unwrap();

        assert_eq!(batch.failed, 1);
        assert_eq!(batch.failed, batch.failures().len());
        assert_eq!(batch.degraded, 1);
        assert_eq!(batch.deployed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_order_and_pacing() {
        let temp = TempDir::new().unwrap();
        for id in ["networking/traefik", "auth/authelia", "data/postgres", "media/plex", "media/sonarr"] {
            add_service(temp.path(), id);
        }
        let tiers = TierConfig {
            infrastructure: vec![String::from("networking/traefik"), String::from("auth/authelia")],
            core: vec![String::from("data/postgres")],
        };
        let started = Arc::new(Mutex::new(Vec::new()));
        let planner = planner(temp.path(), driver(&[], &[], Arc::clone(&started)), tiers);

        let begin = Instant::now();
        let batch = planner.deploy_all(&BatchOptions::default()).await.unwrap();

        assert!(batch.is_success());
        assert_eq!(
            *started.lock().unwrap(),
            vec![
                "networking/traefik",
                "auth/authelia",
                "data/postgres",
                "media/plex",
                "media/sonarr"
            ]
        );
        // 2 x 5s infrastructure, 1 x 3s core, one 2s gap between applications.
        assert_eq!(begin.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_blocks_later_tiers() {
        let temp = monitoring_tree();
        let tiers = TierConfig {
            infrastructure: vec![String::from("networking/missing")],
            core: Vec::new(),
        };
        let started = Arc::new(Mutex::new(Vec::new()));
        let planner = planner(temp.path(), driver(&[], &[], Arc::clone(&started)), tiers);

        let options = BatchOptions {
            strict: true,
            ..BatchOptions::default()
        };
        let batch = planner.deploy_all(&options).await.unwrap();

        assert_eq!(batch.failed, 6);
        assert!(started.lock().unwrap().is_empty());
        assert_eq!(batch.reports[1].outcome, DeploymentOutcome::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_strict_later_tiers_run() {
        let temp = monitoring_tree();
        let tiers = TierConfig {
            infrastructure: vec![String::from("networking/missing")],
            core: Vec::new(),
        };
        let planner = planner(temp.path(), driver(&[], &[], Arc::default()), tiers);

        let batch = planner.deploy_all(&BatchOptions::default()).await.unwrap();

        assert_eq!(batch.failed, 1);
        assert_eq!(batch.deployed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_reports_in_plan_order() {
        let temp = monitoring_tree();
        let planner = planner(
            temp.path(),
            driver(&["monitoring/promtail"], &[], Arc::default()),
            TierConfig::default(),
        );

        let options = BatchOptions {
            parallel: true,
            jobs: Some(3),
            ..BatchOptions::default()
        };
        let batch = planner.deploy_category("monitoring", &options).await.unwrap();

        let order: Vec<&str> = batch.reports.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "monitoring/grafana",
                "monitoring/loki",
                "monitoring/prometheus",
                "monitoring/promtail",
                "monitoring/uptime-kuma"
            ]
        );
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.deployed, 4);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let temp = monitoring_tree();
        let tiers = TierConfig {
            infrastructure: vec![String::from("networking/missing")],
            core: Vec::new(),
        };
        // No expectations: any driver call panics.
        let planner = planner(temp.path(), MockComposeDriver::new(), tiers);

        let options = BatchOptions::new(DeployOptions {
            dry_run: true,
            ..DeployOptions::default()
        });
        let batch = planner.deploy_all(&options).await.unwrap();

        assert_eq!(batch.total(), 6);
        assert_eq!(batch.skipped, 6);
        assert!(batch.reports.iter().all(|r| r.outcome == DeploymentOutcome::DryRun));
    }
}
