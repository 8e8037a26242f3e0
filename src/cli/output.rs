//! Output formatting for CLI commands.
//!
//! Every formatter returns the rendered text; JSON output is pretty-printed
//! with `serde_json` and meant for stdout, text output for stderr.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;
use tabled::{Table, Tabled};

use crate::compose::{ContainerObservation, ContainerStats, PruneReport};
use crate::deploy::{ClassifiedContainer, ContainerHealth, DeploymentOutcome, HealthTally, ServiceReport};
use crate::history::RunRecord;
use crate::planner::{BatchReport, RolloutPlan};
use crate::registry::ServiceDescriptor;
use crate::updates::ImageUpdate;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Container counts of one service, for the status overview.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceOverview {
    /// `category/name` identifier.
    pub service: String,
    /// Running containers.
    pub running: usize,
    /// All containers, stopped ones included.
    pub total: usize,
}

/// Host-wide status: every service plus networks and volumes.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    /// Per-service counts.
    pub services: Vec<ServiceOverview>,
    /// Network names.
    pub networks: Vec<String>,
    /// Volume names.
    pub volumes: Vec<String>,
}

/// Detailed status of one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// `category/name` identifier.
    pub service: String,
    /// Container observations.
    pub containers: Vec<ContainerObservation>,
    /// Classified health of the containers.
    pub health: HealthTally,
    /// Resource usage of running containers.
    pub stats: Vec<ContainerStats>,
    /// Current declaration fingerprint.
    pub declaration_hash: String,
    /// Fingerprint recorded by the last rollout.
    pub recorded_hash: Option<String>,
}

/// Validation result of one declaration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeclarationCheck {
    /// `category/name` identifier.
    pub service: String,
    /// Validator output on failure.
    pub error: Option<String>,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Time")]
    elapsed: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct OverviewRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Containers")]
    containers: String,
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Available")]
    available: String,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Deployed")]
    deployed: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Duration")]
    duration: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true if output is machine-readable.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats a single-service result.
    #[must_use]
    pub fn format_report(&self, report: &ServiceReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }

        let mut output = format!(
            "{} {}: {}\n",
            Self::outcome_marker(&report.outcome),
            report.service.bold(),
            Self::format_outcome(&report.outcome)
        );

        for image in &report.pull_failures {
            let _ = writeln!(output, "   {} pull failed, using cached {image}", "!".yellow());
        }
        if let Some(logs) = &report.recent_logs {
            output.push_str("\nRecent logs:\n");
            for line in logs.lines() {
                let _ = writeln!(output, "   {line}");
            }
        }

        output
    }

    /// Formats a batch result.
    #[must_use]
    pub fn format_batch(&self, batch: &BatchReport) -> String {
        if self.is_json() {
            return Self::json(batch);
        }

        let mut output = String::new();
        if !batch.reports.is_empty() {
            let rows: Vec<ReportRow> = batch
                .reports
                .iter()
                .map(|r| ReportRow {
                    service: r.service.clone(),
                    outcome: Self::format_outcome(&r.outcome),
                    elapsed: format!("{:.1}s", Duration::from_millis(r.elapsed_ms).as_secs_f64()),
                    detail: Self::truncate(Self::outcome_detail(&r.outcome), 50),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let summary = batch.to_string();
        let _ = writeln!(
            output,
            "\n{} {}",
            if batch.is_success() { "✓".green() } else { "✗".red() },
            summary
        );
        output
    }

    /// Formats a rollout plan.
    #[must_use]
    pub fn format_plan(&self, plan: &RolloutPlan) -> String {
        if self.is_json() {
            return Self::json(plan);
        }

        let mut output = format!("\nRollout plan ({}): {} services\n", plan.scope, plan.len());
        for tier in &plan.tiers {
            let _ = writeln!(output, "\n  {} tier", tier.rank.to_string().bold());
            for (index, service) in tier.services.iter().enumerate() {
                let marker = if service.descriptor.is_some() {
                    String::new()
                } else {
                    format!(" {}", "(missing)".red())
                };
                let _ = writeln!(output, "   {:>3}. {}{marker}", index + 1, service.id);
            }
        }
        output
    }

    /// Formats the service list.
    #[must_use]
    pub fn format_services(&self, services: &[ServiceDescriptor]) -> String {
        if self.is_json() {
            return Self::json(services);
        }
        if services.is_empty() {
            return String::from("No services found.\n");
        }

        let mut output = String::new();
        let mut current = "";
        for service in services {
            if service.category != current {
                current = &service.category;
                let _ = writeln!(output, "{}", current.bold());
            }
            let _ = writeln!(output, "   {}", service.name);
        }
        let _ = writeln!(output, "\n{} services", services.len());
        output
    }

    /// Formats the category list.
    #[must_use]
    pub fn format_categories(&self, categories: &[String]) -> String {
        if self.is_json() {
            return Self::json(categories);
        }
        let mut output = String::new();
        for category in categories {
            let _ = writeln!(output, "{category}");
        }
        output
    }

    /// Formats the host-wide status overview.
    #[must_use]
    pub fn format_host_status(&self, status: &HostStatus) -> String {
        if self.is_json() {
            return Self::json(status);
        }

        let rows: Vec<OverviewRow> = status
            .services
            .iter()
            .map(|s| {
                let counts = format!("{}/{}", s.running, s.total);
                OverviewRow {
                    service: s.service.clone(),
                    containers: if s.total == 0 {
                        counts.dimmed().to_string()
                    } else if s.running == s.total {
                        counts.green().to_string()
                    } else {
                        counts.yellow().to_string()
                    },
                }
            })
            .collect();

        let mut output = String::from("\nServices\n");
        output.push_str(&Table::new(rows).to_string());
        let _ = writeln!(output, "\n\nNetworks ({}): {}", status.networks.len(), status.networks.join(", "));
        let _ = writeln!(output, "Volumes ({}): {}", status.volumes.len(), status.volumes.join(", "));
        output
    }

    /// Formats one service's detailed status.
    #[must_use]
    pub fn format_service_status(&self, status: &ServiceStatus) -> String {
        if self.is_json() {
            return Self::json(status);
        }

        let mut output = format!("\n{}\n", status.service.bold());
        if status.containers.is_empty() {
            output.push_str("   No containers.\n");
        } else {
            let rows: Vec<ContainerRow> = status
                .containers
                .iter()
                .map(|c| {
                    let health = status
                        .health
                        .containers
                        .iter()
                        .find(|h| h.name == c.name)
                        .map_or(ContainerHealth::Unknown, |h| h.health);
                    let stats = status.stats.iter().find(|s| s.name == c.name);
                    ContainerRow {
                        name: c.name.clone(),
                        image: Self::truncate(&c.image, 40),
                        state: Self::health_label(health),
                        cpu: stats.map_or_else(|| String::from("-"), |s| s.cpu_percent.clone()),
                        memory: stats.map_or_else(|| String::from("-"), |s| s.memory_usage.clone()),
                    }
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(output, "\nHealth: {}", status.health);
        let _ = write!(output, "Declaration: {}", short_hash(&status.declaration_hash));
        match &status.recorded_hash {
            Some(recorded) if recorded == &status.declaration_hash => {
                let _ = writeln!(output, " (deployed)");
            }
            Some(recorded) => {
                let _ = writeln!(
                    output,
                    " ({} since last rollout {})",
                    "changed".yellow(),
                    short_hash(recorded)
                );
            }
            None => {
                let _ = writeln!(output, " (no rollout recorded)");
            }
        }
        output
    }

    /// Formats a host-wide health check.
    #[must_use]
    pub fn format_health(&self, tally: &HealthTally) -> String {
        if self.is_json() {
            return Self::json(tally);
        }

        let problems: Vec<&ClassifiedContainer> = tally
            .containers
            .iter()
            .filter(|c| c.health.is_unhealthy())
            .collect();

        let mut output = String::new();
        if problems.is_empty() {
            let _ = writeln!(output, "{} All containers healthy ({tally})", "✓".green());
        } else {
            let _ = writeln!(output, "{} {} unhealthy containers:", "✗".red(), problems.len());
            for container in problems {
                let _ = writeln!(
                    output,
                    "   - {} ({})",
                    container.name,
                    Self::health_label(container.health)
                );
            }
            let _ = writeln!(output, "\n{tally}");
        }
        output
    }

    /// Formats declaration validation results.
    #[must_use]
    pub fn format_validation(&self, checks: &[DeclarationCheck]) -> String {
        if self.is_json() {
            return Self::json(checks);
        }

        let mut output = String::new();
        for check in checks {
            match &check.error {
                None => {
                    let _ = writeln!(output, "{} {}", "✓".green(), check.service);
                }
                Some(error) => {
                    let _ = writeln!(output, "{} {}", "✗".red(), check.service);
                    for line in error.lines() {
                        let _ = writeln!(output, "     {line}");
                    }
                }
            }
        }

        let failed = checks.iter().filter(|c| c.error.is_some()).count();
        let _ = writeln!(output, "\n{} declarations, {failed} invalid", checks.len());
        output
    }

    /// Formats the update scan.
    #[must_use]
    pub fn format_updates(&self, updates: &[ImageUpdate]) -> String {
        if self.is_json() {
            return Self::json(updates);
        }
        if updates.is_empty() {
            return format!("{} All images are up to date.\n", "✓".green());
        }

        let rows: Vec<UpdateRow> = updates
            .iter()
            .map(|u| UpdateRow {
                service: u.service.clone(),
                image: u.image.clone(),
                current: u.current_tag.clone(),
                available: u.new_tag.green().to_string(),
            })
            .collect();
        format!("{}\n\n{} updates available\n", Table::new(rows), updates.len())
    }

    /// Formats recent history runs.
    #[must_use]
    pub fn format_history(&self, runs: &[RunRecord]) -> String {
        if self.is_json() {
            return Self::json(runs);
        }
        if runs.is_empty() {
            return String::from("No deployments recorded.\n");
        }

        let rows: Vec<RunRow> = runs
            .iter()
            .map(|r| RunRow {
                started: r.started_at.format("%Y-%m-%d %H:%M").to_string(),
                command: r.command.clone(),
                host: r.host.clone(),
                deployed: r.deployed,
                failed: r.failed,
                duration: format!("{}s", r.duration_secs()),
            })
            .collect();
        format!("{}\n", Table::new(rows))
    }

    /// Formats a prune result.
    #[must_use]
    pub fn format_prune(&self, report: &PruneReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }
        format!("{} Reclaimed {}\n", "✓".green(), report.reclaimed)
    }

    /// Formats a plain confirmation message.
    #[must_use]
    pub fn format_message(&self, message: &str) -> String {
        if self.is_json() {
            return Self::json(&serde_json::json!({ "status": "success", "message": message }));
        }
        format!("{} {message}\n", "✓".green())
    }

    fn outcome_marker(outcome: &DeploymentOutcome) -> colored::ColoredString {
        if outcome.is_fatal() {
            "✗".red()
        } else if outcome.is_degraded() {
            "!".yellow()
        } else {
            "✓".green()
        }
    }

    /// Formats an outcome with color.
    fn format_outcome(outcome: &DeploymentOutcome) -> String {
        let label = match outcome.health() {
            Some(health) => format!("{} ({})", outcome.label(), health.label()),
            None => outcome.label().to_string(),
        };

        if outcome.is_fatal() {
            label.red().to_string()
        } else if outcome.is_degraded() {
            label.yellow().to_string()
        } else if outcome.is_deployed() {
            label.green().to_string()
        } else {
            label.dimmed().to_string()
        }
    }

    fn outcome_detail(outcome: &DeploymentOutcome) -> &str {
        match outcome {
            DeploymentOutcome::Failed { reason } => reason.detail(),
            _ => "",
        }
    }

    /// Formats a container health state with color.
    fn health_label(health: ContainerHealth) -> String {
        let label = health.to_string();
        if health.is_healthy() {
            label.green().to_string()
        } else if health.is_transient() {
            label.yellow().to_string()
        } else {
            label.red().to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        let first_line = s.lines().next().unwrap_or_default();
        if first_line.chars().count() <= max_len {
            first_line.to_string()
        } else {
            let cut: String = first_line.chars().take(max_len.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }
}

fn short_hash(hash: &str) -> &str {
    crate::config::DeclarationHasher::short(hash)
}
