//! Docker CLI implementation of the compose and runtime adapters.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ComposeError, EnvironmentError, HomestackError, Result};

use super::driver::{ComposeDriver, ContainerRuntime};
use super::process::{CommandOutput, CommandRunner};
use super::types::{
    ComposeProject, ContainerObservation, ContainerStats, HealthProbe, PruneReport, PullReport,
    RuntimeStatus,
};

/// Default container runtime binary.
const DOCKER_BIN: &str = "docker";

/// Label the compose tool stamps on every container with its service name.
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Label the compose tool stamps on every container with its project name.
const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Drives the `docker` and `docker compose` command lines.
#[derive(Debug, Clone)]
pub struct DockerCli {
    /// Command runner for the docker binary.
    runner: CommandRunner,
}

/// One entry of `docker compose ps --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComposePsEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    health: String,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerPsEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    labels: String,
}

/// The subset of `docker inspect` output the orchestrator reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Option<InspectConfig>,
    #[serde(default)]
    state: Option<InspectState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    #[serde(default)]
    status: String,
}

/// One line of `docker stats --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct StatsEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    mem_percent: String,
}

impl DockerCli {
    /// Creates an adapter over the `docker` binary.
    #[must_use]
    pub fn new(command_timeout: Duration) -> Self {
        Self::with_program(DOCKER_BIN, command_timeout)
    }

    /// Creates an adapter over a specific binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(program, command_timeout),
        }
    }

    /// Builds `compose` arguments addressing `project`.
    fn compose_args(project: &ComposeProject, extra: &[&str]) -> Vec<String> {
        let mut args = vec![
            String::from("compose"),
            String::from("-p"),
            project.project_name.clone(),
            String::from("--project-directory"),
            project.directory.display().to_string(),
            String::from("-f"),
            project.compose_file.display().to_string(),
            String::from("--env-file"),
            project.env_file.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| (*s).to_string()));
        args
    }

    /// Runs a compose subcommand, failing on non-zero exit.
    async fn compose(&self, project: &ComposeProject, extra: &[&str]) -> Result<CommandOutput> {
        self.runner.run_checked(&Self::compose_args(project, extra)).await
    }

    /// Lists the image references the declaration uses.
    async fn images(&self, project: &ComposeProject) -> Result<Vec<String>> {
        let output = self.compose(project, &["config", "--images"]).await?;
        Ok(parse_lines(&output.stdout))
    }

    /// Resolves one image reference to its local image ID.
    async fn image_id(&self, image: &str) -> Result<Option<String>> {
        let args = to_args(&["image", "inspect", "--format", "{{.Id}}", image]);
        let output = self.runner.run(&args).await?;
        Ok(output
            .success()
            .then(|| output.stdout.trim().to_string())
            .filter(|id| !id.is_empty()))
    }
}

#[async_trait]
impl ComposeDriver for DockerCli {
    async fn validate(&self, project: &ComposeProject) -> Result<()> {
        let output = self
            .runner
            .run(&Self::compose_args(project, &["config", "--quiet"]))
            .await?;

        if output.success() {
            Ok(())
        } else {
            Err(ComposeError::SyntaxError {
                service: project.service.clone(),
                detail: output.stderr.trim().to_string(),
            }
            .into())
        }
    }

    async fn pull(&self, project: &ComposeProject) -> Result<PullReport> {
        let mut report = PullReport::default();

        for image in self.images(project).await? {
            debug!("Pulling {image}");
            let output = self.runner.run(&to_args(&["pull", &image])).await;
            match output {
                Ok(out) if out.success() => report.pulled.push(image),
                Ok(out) => {
                    warn!("Pull of {image} failed: {}", out.stderr.trim());
                    report.failed.push(image);
                }
                Err(e) => {
                    warn!("Pull of {image} failed: {e}");
                    report.failed.push(image);
                }
            }
        }

        Ok(report)
    }

    async fn resolved_digests(&self, project: &ComposeProject) -> Result<BTreeSet<String>> {
        let mut digests = BTreeSet::new();
        for image in self.images(project).await? {
            match self.image_id(&image).await? {
                Some(id) => {
                    digests.insert(id);
                }
                None => debug!("Image {image} is not present locally"),
            }
        }
        Ok(digests)
    }

    async fn running_digests(&self, project: &ComposeProject) -> Result<BTreeSet<String>> {
        let output = self.compose(project, &["ps", "-q"]).await?;
        let ids = parse_lines(&output.stdout);
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut args = to_args(&["inspect", "--format", "{{.Image}}"]);
        args.extend(ids);
        let output = self.runner.run_checked(&args).await?;
        Ok(parse_lines(&output.stdout).into_iter().collect())
    }

    async fn stop(&self, project: &ComposeProject, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.compose(project, &["down", "--timeout", &secs]).await?;
        Ok(())
    }

    async fn start(&self, project: &ComposeProject) -> Result<()> {
        self.compose(project, &["up", "-d"]).await?;
        Ok(())
    }

    async fn snapshot(&self, project: &ComposeProject) -> Result<Vec<ContainerObservation>> {
        let output = self
            .compose(project, &["ps", "--all", "--format", "json"])
            .await?;
        parse_compose_ps(&output.stdout)
    }

    async fn logs(&self, project: &ComposeProject, tail: u32) -> Result<String> {
        let tail = tail.to_string();
        let output = self
            .compose(project, &["logs", "--no-color", "--tail", &tail])
            .await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<String> {
        let args = to_args(&["info", "--format", "{{.ServerVersion}}"]);
        match self.runner.run_checked(&args).await {
            Ok(output) => Ok(output.stdout.trim().to_string()),
            Err(HomestackError::Compose(e)) => Err(EnvironmentError::DaemonUnreachable {
                message: e.to_string(),
            }
            .into()),
            Err(e) => Err(e),
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerObservation>> {
        let args = to_args(&["ps", "--all", "--format", "{{json .}}"]);
        let output = self.runner.run_checked(&args).await?;
        parse_docker_ps(&output.stdout)
    }

    async fn find_containers(&self, pattern: &str) -> Result<Vec<ContainerObservation>> {
        let filter = format!("name={pattern}");
        let args = to_args(&["ps", "--all", "--filter", &filter, "--format", "{{json .}}"]);
        let output = self.runner.run_checked(&args).await?;
        parse_docker_ps(&output.stdout)
    }

    async fn inspect(&self, id: &str) -> Result<Option<ContainerObservation>> {
        let output = self.runner.run(&to_args(&["inspect", id])).await?;
        if !output.success() {
            return Ok(None);
        }
        parse_inspect(&output.stdout)
    }

    async fn stats(&self, names: Vec<String>) -> Result<Vec<ContainerStats>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = to_args(&["stats", "--no-stream", "--format", "{{json .}}"]);
        args.extend(names);
        let output = self.runner.run_checked(&args).await?;
        parse_stats(&output.stdout)
    }

    async fn prune(&self, volumes: bool) -> Result<PruneReport> {
        let mut args = to_args(&["system", "prune", "-f"]);
        if volumes {
            args.push(String::from("--volumes"));
        }
        let output = self.runner.run_checked(&args).await?;
        Ok(PruneReport {
            reclaimed: parse_reclaimed(&output.stdout),
        })
    }

    async fn networks(&self) -> Result<Vec<String>> {
        let args = to_args(&["network", "ls", "--format", "{{.Name}}"]);
        let output = self.runner.run_checked(&args).await?;
        Ok(parse_lines(&output.stdout))
    }

    async fn volumes(&self) -> Result<Vec<String>> {
        let args = to_args(&["volume", "ls", "--format", "{{.Name}}"]);
        let output = self.runner.run_checked(&args).await?;
        Ok(parse_lines(&output.stdout))
    }
}

// =============================================================================
// Output parsing
// =============================================================================

fn to_args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

/// Splits output into trimmed, non-empty lines.
fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parses `docker compose ps --format json`, which is a JSON array on older
/// compose releases and one object per line on newer ones.
fn parse_compose_ps(stdout: &str) -> Result<Vec<ContainerObservation>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<ComposePsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| ComposeError::invalid_output(e.to_string()))?
    } else {
        parse_lines(trimmed)
            .iter()
            .map(|line| serde_json::from_str(line))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ComposeError::invalid_output(e.to_string()))?
    };

    Ok(entries
        .into_iter()
        .map(|e| ContainerObservation {
            id: e.id,
            name: e.name,
            service: e.service.filter(|s| !s.is_empty()),
            project: e.project.filter(|p| !p.is_empty()),
            image: e.image,
            status: RuntimeStatus::parse(&e.state),
            health: HealthProbe::parse(&e.health),
        })
        .collect())
}

/// Parses `docker ps --format '{{json .}}'` output.
fn parse_docker_ps(stdout: &str) -> Result<Vec<ContainerObservation>> {
    parse_lines(stdout)
        .iter()
        .map(|line| {
            let entry: DockerPsEntry = serde_json::from_str(line)
                .map_err(|e| ComposeError::invalid_output(e.to_string()))?;

            // Older runtimes omit `State`; fall back to the status text.
            let status = if entry.state.is_empty() {
                RuntimeStatus::parse(entry.status.split_whitespace().next().unwrap_or_default())
            } else {
                RuntimeStatus::parse(&entry.state)
            };

            Ok(ContainerObservation {
                id: entry.id,
                name: entry.names,
                service: label_value(&entry.labels, COMPOSE_SERVICE_LABEL),
                project: label_value(&entry.labels, COMPOSE_PROJECT_LABEL),
                image: entry.image,
                status,
                health: HealthProbe::from_status_text(&entry.status),
            })
        })
        .collect()
}

/// Reads one label out of the comma-joined `key=value` label column.
fn label_value(labels: &str, key: &str) -> Option<String> {
    labels.split(',').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// Parses `docker inspect` output for a single container.
fn parse_inspect(stdout: &str) -> Result<Option<ContainerObservation>> {
    let entries: Vec<InspectEntry> =
        serde_json::from_str(stdout.trim()).map_err(|e| ComposeError::invalid_output(e.to_string()))?;

    Ok(entries.into_iter().next().map(|entry| {
        let (image, service, project) = entry.config.map_or_else(
            || (String::new(), None, None),
            |c| {
                let mut labels = c.labels.unwrap_or_default();
                let service = labels.remove(COMPOSE_SERVICE_LABEL);
                let project = labels.remove(COMPOSE_PROJECT_LABEL);
                (c.image, service, project)
            },
        );
        let (status, health) = entry.state.map_or((RuntimeStatus::Unknown, HealthProbe::None), |s| {
            (
                RuntimeStatus::parse(&s.status),
                s.health.map_or(HealthProbe::None, |h| HealthProbe::parse(&h.status)),
            )
        });

        ContainerObservation {
            id: entry.id,
            name: entry.name.trim_start_matches('/').to_string(),
            service,
            project,
            image,
            status,
            health,
        }
    }))
}

/// Parses `docker stats --format '{{json .}}'` output.
fn parse_stats(stdout: &str) -> Result<Vec<ContainerStats>> {
    parse_lines(stdout)
        .iter()
        .map(|line| {
            let entry: StatsEntry = serde_json::from_str(line)
                .map_err(|e| ComposeError::invalid_output(e.to_string()))?;
            Ok(ContainerStats {
                name: entry.name,
                cpu_percent: entry.cpu,
                memory_usage: entry.mem_usage,
                memory_percent: entry.mem_percent,
            })
        })
        .collect()
}

/// Extracts the reclaimed space from `docker system prune` output.
fn parse_reclaimed(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Total reclaimed space:"))
        .map_or_else(|| String::from("0B"), |v| v.trim().to_string())
}
