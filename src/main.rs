//! Homestack CLI entrypoint.
//!
//! This is the main entrypoint for the homestack command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use homestack_deploy::cli::{
    BatchArgs, Cli, Commands, DeclarationCheck, HostStatus, OutputFormatter, ServiceOverview,
    ServiceStatus,
};
use homestack_deploy::compose::{ComposeDriver, ComposeProject, ContainerRuntime, DockerCli, RuntimeStatus};
use homestack_deploy::config::{load_config, ConfigValidator, DeclarationHasher, OrchestratorConfig};
use homestack_deploy::deploy::{
    DeployOptions, DeploymentEngine, DeploymentOutcome, FailureReason, HealthTally, ServiceReport,
};
use homestack_deploy::environment::{EnvResolver, RuntimeEnvironment};
use homestack_deploy::error::{ComposeError, DeployError, HomestackError, RegistryError, Result};
use homestack_deploy::history::{HistoryStore, LocalHistoryStore, RunRecord};
use homestack_deploy::planner::{BatchOptions, BatchReport, OrchestrationPlanner, PlanScope};
use homestack_deploy::registry::ServiceRegistry;
use homestack_deploy::updates::{write_github_env, UpdateChecker};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_invocation_fatal() => {
            eprintln!("Error: {e}");
            eprintln!("Aborted before any service was touched.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings shared by every command.
struct Context {
    /// Tool configuration, overrides applied.
    config: OrchestratorConfig,
    /// Working directory the environment search starts from.
    cwd: PathBuf,
    /// Explicit environment file.
    env_file: Option<PathBuf>,
    /// Change nothing.
    dry_run: bool,
    /// Output rendering.
    formatter: OutputFormatter,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    if let Commands::Init { path, force } = &cli.command {
        return cmd_init(path, *force, &formatter);
    }

    let cwd = std::env::current_dir()?;
    let mut config = load_config(cli.config.as_deref(), &cwd)?;
    if let Some(root) = cli.root {
        config.services_root = root;
    }

    let validation = ConfigValidator::new().validate(&config)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let ctx = Context {
        config,
        cwd,
        env_file: cli.env_file,
        dry_run: cli.dry_run,
        formatter,
    };

    let label = cli.command.journal_label().unwrap_or("deploy");
    match cli.command {
        Commands::Deploy {
            service,
            force,
            pull_only,
            timeout,
        } => {
            let options = DeployOptions {
                force,
                pull_only,
                dry_run: ctx.dry_run,
                health_timeout: timeout.map(Duration::from_secs),
            };
            cmd_deploy(&ctx, label, &service, &options).await
        }
        Commands::Redeploy { service } => {
            let options = DeployOptions {
                dry_run: ctx.dry_run,
                ..DeployOptions::forced()
            };
            cmd_deploy(&ctx, label, &service, &options).await
        }
        Commands::DeployCategory { category, batch } => {
            cmd_batch(&ctx, label, PlanScope::Category(category), &batch).await
        }
        Commands::DeployAll { batch } => cmd_batch(&ctx, label, PlanScope::All, &batch).await,
        Commands::DeployInfrastructure { force, strict } => {
            let batch = BatchArgs {
                force,
                strict,
                ..BatchArgs::default()
            };
            cmd_batch(&ctx, label, PlanScope::Infrastructure, &batch).await
        }
        Commands::Status { service: None } => cmd_host_status(&ctx).await,
        Commands::Status {
            service: Some(service),
        } => cmd_service_status(&ctx, &service).await,
        Commands::Health => cmd_health(&ctx).await,
        Commands::List { category } => cmd_list(&ctx, category.as_deref()),
        Commands::ListCategories => {
            let categories = registry(&ctx.config).categories()?;
            emit(&ctx.formatter, &ctx.formatter.format_categories(&categories));
            Ok(())
        }
        Commands::Logs { service, tail } => cmd_logs(&ctx, &service, tail).await,
        Commands::Down { service } => cmd_down(&ctx, &service).await,
        Commands::Cleanup { volumes } => cmd_cleanup(&ctx, volumes).await,
        Commands::Validate => cmd_validate(&ctx).await,
        Commands::CheckUpdates { write, github_env } => {
            cmd_check_updates(&ctx, write, github_env.as_deref()).await
        }
        Commands::History { limit } => cmd_history(&ctx, limit).await,
        Commands::Init { .. } => Ok(()),
    }
}

/// Write a configuration template.
fn cmd_init(path: &Path, force: bool, formatter: &OutputFormatter) -> Result<()> {
    info!("Initializing Homestack configuration in: {}", path.display());

    let config_path = path.join("homestack.yaml");
    let env_path = path.join(".env.example");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/homestack.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    eprintln!("\nNext steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your values");
    eprintln!("  2. List infrastructure and core services in homestack.yaml");
    eprintln!("  3. Run 'homestack validate' to check every declaration");
    eprintln!("  4. Run 'homestack deploy-all --dry-run' to see the rollout plan");

    emit(formatter, &formatter.format_message("initialized"));
    Ok(())
}

/// Deploy one service.
async fn cmd_deploy(ctx: &Context, label: &str, service: &str, options: &DeployOptions) -> Result<()> {
    let planner = prepare(ctx).await?;
    let record = RunRecord::begin(label);

    let report = planner.deploy_service(service, options).await;
    emit(&ctx.formatter, &ctx.formatter.format_report(&report));

    if !ctx.dry_run {
        record_run(ctx, record.finish(std::slice::from_ref(&report))).await;
    }

    failure_error(&report).map_or(Ok(()), Err)
}

/// Deploy a tier-ordered batch.
async fn cmd_batch(ctx: &Context, label: &str, scope: PlanScope, args: &BatchArgs) -> Result<()> {
    let planner = prepare(ctx).await?;
    let record = RunRecord::begin(label);

    let options = BatchOptions {
        deploy: DeployOptions {
            force: args.force,
            dry_run: ctx.dry_run,
            ..DeployOptions::default()
        },
        parallel: args.parallel,
        jobs: args.jobs,
        strict: args.strict,
    };

    if ctx.dry_run && !ctx.formatter.is_json() {
        let plan = planner.plan(&scope)?;
        emit(&ctx.formatter, &ctx.formatter.format_plan(&plan));
    }

    let batch = match &scope {
        PlanScope::All => planner.deploy_all(&options).await?,
        PlanScope::Infrastructure => planner.deploy_infrastructure(&options).await?,
        PlanScope::Category(category) => planner.deploy_category(category, &options).await?,
    };
    emit(&ctx.formatter, &ctx.formatter.format_batch(&batch));

    if !ctx.dry_run {
        record_run(ctx, record.finish(&batch.reports)).await;
    }

    batch_result(&batch)
}

/// Show every service's container counts, networks and volumes.
async fn cmd_host_status(ctx: &Context) -> Result<()> {
    let docker = docker(&ctx.config);
    check_daemon(&docker).await?;

    let services = registry(&ctx.config).discover()?;
    let containers = docker.list_containers().await?;

    let overview = services
        .iter()
        .map(|descriptor| {
            let project = descriptor.project_name();
            let owned: Vec<_> = containers.iter().filter(|c| c.belongs_to(&project)).collect();
            ServiceOverview {
                service: descriptor.id(),
                running: owned.iter().filter(|c| c.status == RuntimeStatus::Running).count(),
                total: owned.len(),
            }
        })
        .collect();

    let status = HostStatus {
        services: overview,
        networks: docker.networks().await?,
        volumes: docker.volumes().await?,
    };
    emit(&ctx.formatter, &ctx.formatter.format_host_status(&status));
    Ok(())
}

/// Show one service's containers, health, resource usage and fingerprint.
async fn cmd_service_status(ctx: &Context, service: &str) -> Result<()> {
    let docker = docker(&ctx.config);
    check_daemon(&docker).await?;
    let environment = resolve_environment(ctx)?;

    let descriptor = registry(&ctx.config).resolve(service)?;
    let project = ComposeProject::new(&descriptor, &environment);

    let mut containers = docker.snapshot(&project).await?;
    if containers.is_empty() {
        debug!("No compose containers for {service}, matching by name");
        containers = docker.find_containers(&project.project_name).await?;
    }

    let running: Vec<String> = containers
        .iter()
        .filter(|c| c.status == RuntimeStatus::Running)
        .map(|c| c.name.clone())
        .collect();
    let stats = if running.is_empty() {
        Vec::new()
    } else {
        docker.stats(running).await.unwrap_or_else(|e| {
            warn!("Stats unavailable: {e}");
            Vec::new()
        })
    };

    let declaration_hash = DeclarationHasher::new()
        .hash_file(&descriptor.id(), &descriptor.compose_file)
        .await?;
    let recorded_hash = match history_store(&ctx.config) {
        Ok(store) => store
            .last_service_record(&descriptor.id())
            .await
            .unwrap_or_else(|e| {
                warn!("History unavailable: {e}");
                None
            })
            .and_then(|record| record.declaration_hash),
        Err(e) => {
            warn!("History unavailable: {e}");
            None
        }
    };

    let status = ServiceStatus {
        service: descriptor.id(),
        health: HealthTally::from_observations(&containers),
        containers,
        stats,
        declaration_hash,
        recorded_hash,
    };
    emit(&ctx.formatter, &ctx.formatter.format_service_status(&status));
    Ok(())
}

/// Check every live container on the host.
async fn cmd_health(ctx: &Context) -> Result<()> {
    let docker = docker(&ctx.config);
    check_daemon(&docker).await?;

    // Exited and never-started containers are one-shot jobs, not failures.
    let live: Vec<_> = docker
        .list_containers()
        .await?
        .into_iter()
        .filter(|c| !matches!(c.status, RuntimeStatus::Exited | RuntimeStatus::Created))
        .collect();

    let tally = HealthTally::from_observations(&live);
    emit(&ctx.formatter, &ctx.formatter.format_health(&tally));

    if tally.unhealthy > 0 {
        return Err(DeployError::Unhealthy {
            unhealthy: tally.unhealthy,
        }
        .into());
    }
    Ok(())
}

/// List discovered services.
fn cmd_list(ctx: &Context, category: Option<&str>) -> Result<()> {
    let registry = registry(&ctx.config);
    let services = match category {
        Some(category) => registry.discover_category(category)?,
        None => registry.discover()?,
    };
    emit(&ctx.formatter, &ctx.formatter.format_services(&services));
    Ok(())
}

/// Show recent logs of a service.
async fn cmd_logs(ctx: &Context, service: &str, tail: u32) -> Result<()> {
    let planner = prepare(ctx).await?;
    let engine = planner.engine();
    let project = engine.project(&engine.registry().resolve(service)?);

    let logs = engine.driver().logs(&project, tail).await?;
    if ctx.formatter.is_json() {
        emit(
            &ctx.formatter,
            &serde_json::to_string_pretty(&serde_json::json!({ "service": service, "logs": logs }))
                .unwrap_or_default(),
        );
    } else {
        eprint!("{logs}");
    }
    Ok(())
}

/// Stop and remove a service's containers.
async fn cmd_down(ctx: &Context, service: &str) -> Result<()> {
    let planner = prepare(ctx).await?;
    let engine = planner.engine();
    let descriptor = engine.registry().resolve(service)?;
    let project = engine.project(&descriptor);

    if ctx.dry_run {
        emit(&ctx.formatter, &ctx.formatter.format_message(&format!("would stop {descriptor}")));
        return Ok(());
    }

    engine
        .driver()
        .stop(&project, ctx.config.deploy.stop_timeout())
        .await?;
    emit(&ctx.formatter, &ctx.formatter.format_message(&format!("stopped {descriptor}")));
    Ok(())
}

/// Remove unused runtime data.
async fn cmd_cleanup(ctx: &Context, volumes: bool) -> Result<()> {
    let docker = docker(&ctx.config);
    check_daemon(&docker).await?;

    if ctx.dry_run {
        let command = if volumes {
            "docker system prune -f --volumes"
        } else {
            "docker system prune -f"
        };
        emit(&ctx.formatter, &ctx.formatter.format_message(&format!("would run `{command}`")));
        return Ok(());
    }

    let report = docker.prune(volumes).await?;
    emit(&ctx.formatter, &ctx.formatter.format_prune(&report));
    Ok(())
}

/// Validate the environment and every compose declaration.
async fn cmd_validate(ctx: &Context) -> Result<()> {
    let planner = prepare(ctx).await?;
    let engine = planner.engine();
    let services = engine.registry().discover()?;

    let mut checks = Vec::with_capacity(services.len());
    for descriptor in &services {
        let error = match engine.driver().validate(&engine.project(descriptor)).await {
            Ok(()) => None,
            Err(HomestackError::Compose(ComposeError::SyntaxError { detail, .. })) => Some(detail),
            Err(e) => Some(e.to_string()),
        };
        checks.push(DeclarationCheck {
            service: descriptor.id(),
            error,
        });
    }

    emit(&ctx.formatter, &ctx.formatter.format_validation(&checks));

    let failed = checks.iter().filter(|c| c.error.is_some()).count();
    if failed > 0 {
        return Err(DeployError::BatchFailed {
            failed,
            total: checks.len(),
        }
        .into());
    }
    Ok(())
}

/// Check Docker Hub for newer image versions.
async fn cmd_check_updates(ctx: &Context, write: bool, github_env: Option<&Path>) -> Result<()> {
    let checker = UpdateChecker::from_config(&ctx.config.updates)?;
    let updates = checker.scan(&registry(&ctx.config)).await?;

    emit(&ctx.formatter, &ctx.formatter.format_updates(&updates));

    if write && !ctx.dry_run {
        for update in &updates {
            UpdateChecker::apply(update).await?;
        }
    }

    if let Some(path) = github_env {
        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        write_github_env(path, &updates, &date).await?;
        info!("Wrote update summary to {}", path.display());
    }
    Ok(())
}

/// Show recent deployment runs.
async fn cmd_history(ctx: &Context, limit: usize) -> Result<()> {
    let store = history_store(&ctx.config)?;
    debug!("Reading history from {} backend", store.backend_type());
    let runs = store.recent(limit).await?;
    emit(&ctx.formatter, &ctx.formatter.format_history(&runs));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Prints formatted output: JSON to stdout, text to stderr.
fn emit(formatter: &OutputFormatter, output: &str) {
    if formatter.is_json() {
        println!("{output}");
    } else {
        eprint!("{output}");
    }
}

fn registry(config: &OrchestratorConfig) -> ServiceRegistry {
    ServiceRegistry::new(&config.services_root, config.compose_files.clone())
}

fn docker(config: &OrchestratorConfig) -> Arc<DockerCli> {
    Arc::new(DockerCli::new(config.deploy.command_timeout()))
}

/// Resolves the shared environment file.
fn resolve_environment(ctx: &Context) -> Result<RuntimeEnvironment> {
    let resolver = ctx.env_file.as_ref().map_or_else(
        || EnvResolver::from_config(&ctx.config.environment, &ctx.cwd, |key| std::env::var(key).ok()),
        EnvResolver::explicit,
    );
    resolver.resolve()
}

/// Fails with `DaemonUnreachable` unless the container daemon answers.
async fn check_daemon(runtime: &DockerCli) -> Result<()> {
    let version = runtime.ping().await?;
    debug!("Docker daemon version {version}");
    Ok(())
}

/// Resolves the environment, checks the daemon, and wires the planner.
async fn prepare(ctx: &Context) -> Result<OrchestrationPlanner> {
    let environment = resolve_environment(ctx)?;
    let docker = docker(&ctx.config);
    check_daemon(&docker).await?;

    let driver: Arc<dyn ComposeDriver> = docker.clone();
    let runtime: Arc<dyn ContainerRuntime> = docker;
    let engine = DeploymentEngine::from_config(&ctx.config, environment, driver, runtime);

    Ok(OrchestrationPlanner::from_config(&ctx.config, engine))
}

fn history_store(config: &OrchestratorConfig) -> Result<LocalHistoryStore> {
    let store = match &config.history.path {
        Some(path) => LocalHistoryStore::with_path(path),
        None => LocalHistoryStore::new()?,
    };
    Ok(store.with_keep(config.history.keep))
}

/// Appends a run to the journal. Failures are logged only.
async fn record_run(ctx: &Context, record: RunRecord) {
    let store = match history_store(&ctx.config) {
        Ok(store) => store,
        Err(e) => {
            warn!("Not recording run: {e}");
            return;
        }
    };

    if let Err(e) = store.append(&record).await {
        warn!("Failed to record run in {}: {e}", store.path().display());
    }
}

/// Maps a fatal single-service outcome to its error.
fn failure_error(report: &ServiceReport) -> Option<HomestackError> {
    match &report.outcome {
        DeploymentOutcome::Failed { reason } => Some(match reason {
            FailureReason::PathNotFound(_) => RegistryError::PathNotFound {
                path: PathBuf::from(&report.service),
            }
            .into(),
            FailureReason::Validation(detail) => ComposeError::SyntaxError {
                service: report.service.clone(),
                detail: detail.clone(),
            }
            .into(),
            FailureReason::Start(reason) => DeployError::StartFailure {
                service: report.service.clone(),
                reason: reason.clone(),
            }
            .into(),
        }),
        DeploymentOutcome::Blocked => Some(DeployError::BatchFailed { failed: 1, total: 1 }.into()),
        _ => None,
    }
}

/// A batch fails when any service failed.
fn batch_result(batch: &BatchReport) -> Result<()> {
    if batch.is_success() {
        Ok(())
    } else {
        Err(DeployError::BatchFailed {
            failed: batch.failed,
            total: batch.total(),
        }
        .into())
    }
}
